//! In-memory GitLab used by the integration tests.
//!
//! Serves merge requests, notes and approvals from maps that tests can edit
//! between sync runs, and counts every detail request so tests can assert
//! what a run fetched.

#![allow(dead_code)]

use async_trait::async_trait;
use mr_insights::db::{self, pool::DbPool};
use mr_insights::error::AppError;
use mr_insights::services::gitlab_client::{
    GitLabApprovalEvent, GitLabGroup, GitLabMergeRequest, GitLabNote, GitLabProject, GitLabUser,
};
use mr_insights::services::pagination::PaginatedResponse;
use mr_insights::services::MergeRequestSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

pub const PROJECT_ID: i64 = 7;

/// 2024-01-15T10:00:00Z
pub const BASE_TS: i64 = 1_705_312_800;

#[derive(Default)]
pub struct FakeSource {
    pub groups: Vec<GitLabGroup>,
    pub projects: Vec<GitLabProject>,
    pub merge_requests: Mutex<HashMap<i64, Vec<GitLabMergeRequest>>>,
    pub notes: Mutex<HashMap<i64, Vec<GitLabNote>>>,
    pub approvals: Mutex<HashMap<i64, Vec<GitLabApprovalEvent>>>,

    /// Report `x-total-pages` as 0, like GitLab does for large collections.
    pub hide_total_pages: bool,

    /// Fail merge request pages from this page number on.
    pub fail_mr_page_from: Option<u32>,

    pub fail_approvals: bool,

    /// Group whose projects were last listed.
    pub listed_group: Mutex<Option<i64>>,

    pub mr_page_calls: AtomicUsize,
    pub note_calls: AtomicUsize,
    pub approval_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_project() -> Self {
        Self {
            projects: vec![project(PROJECT_ID, "acme/api")],
            ..Default::default()
        }
    }

    pub fn set_merge_requests(&self, project_id: i64, mrs: Vec<GitLabMergeRequest>) {
        self.merge_requests.lock().unwrap().insert(project_id, mrs);
    }

    /// Edit one merge request in place.
    pub fn edit_merge_request(&self, project_id: i64, iid: i64, f: impl FnOnce(&mut GitLabMergeRequest)) {
        let mut all = self.merge_requests.lock().unwrap();
        let mr = all
            .get_mut(&project_id)
            .and_then(|mrs| mrs.iter_mut().find(|m| m.iid == iid))
            .expect("merge request exists");
        f(mr);
    }

    pub fn set_notes(&self, iid: i64, notes: Vec<GitLabNote>) {
        self.notes.lock().unwrap().insert(iid, notes);
    }

    pub fn set_approvals(&self, iid: i64, approved_at: &[&str]) {
        let events = approved_at
            .iter()
            .map(|ts| GitLabApprovalEvent {
                created_at: ts.to_string(),
            })
            .collect();
        self.approvals.lock().unwrap().insert(iid, events);
    }

    pub fn note_calls(&self) -> usize {
        self.note_calls.load(Ordering::SeqCst)
    }

    pub fn approval_calls(&self) -> usize {
        self.approval_calls.load(Ordering::SeqCst)
    }

    fn page_of<T: Clone>(&self, items: &[T], page: u32, per_page: u32) -> PaginatedResponse<T> {
        let start = ((page.saturating_sub(1)) * per_page) as usize;
        let end = (start + per_page as usize).min(items.len());
        let data = items.get(start..end).map(|s| s.to_vec()).unwrap_or_default();
        let total_pages = if self.hide_total_pages {
            0
        } else {
            (items.len() as u32).div_ceil(per_page.max(1))
        };
        PaginatedResponse::new(data, page, per_page, total_pages)
    }
}

#[async_trait]
impl MergeRequestSource for FakeSource {
    async fn list_groups(&self, search: &str) -> Result<Vec<GitLabGroup>, AppError> {
        let needle = search.to_lowercase();
        Ok(self
            .groups
            .iter()
            .filter(|g| g.name.to_lowercase().contains(&needle) || g.path.contains(&needle))
            .cloned()
            .collect())
    }

    async fn list_group_projects(&self, group_id: i64) -> Result<Vec<GitLabProject>, AppError> {
        *self.listed_group.lock().unwrap() = Some(group_id);
        Ok(self.projects.clone())
    }

    async fn get_project(&self, id_or_path: &str) -> Result<GitLabProject, AppError> {
        self.projects
            .iter()
            .find(|p| p.id.to_string() == id_or_path || p.path_with_namespace == id_or_path)
            .cloned()
            .ok_or_else(|| AppError::not_found_with_id("project", id_or_path))
    }

    async fn list_merge_requests(
        &self,
        project_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<PaginatedResponse<GitLabMergeRequest>, AppError> {
        self.mr_page_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mr_page_from.is_some_and(|from| page >= from) {
            return Err(AppError::gitlab_api_full(
                "Bad gateway",
                502,
                format!("/projects/{}/merge_requests", project_id),
            ));
        }
        let all = self.merge_requests.lock().unwrap();
        let mrs = all.get(&project_id).cloned().unwrap_or_default();
        Ok(self.page_of(&mrs, page, per_page))
    }

    async fn list_notes(
        &self,
        _project_id: i64,
        mr_iid: i64,
        page: u32,
        per_page: u32,
    ) -> Result<PaginatedResponse<GitLabNote>, AppError> {
        self.note_calls.fetch_add(1, Ordering::SeqCst);
        let notes = self.notes.lock().unwrap().get(&mr_iid).cloned().unwrap_or_default();
        Ok(self.page_of(&notes, page, per_page))
    }

    async fn list_approval_events(
        &self,
        _project_id: i64,
        mr_iid: i64,
    ) -> Result<Vec<GitLabApprovalEvent>, AppError> {
        self.approval_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_approvals {
            return Err(AppError::network("connection reset"));
        }
        Ok(self
            .approvals
            .lock()
            .unwrap()
            .get(&mr_iid)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn project(id: i64, path: &str) -> GitLabProject {
    GitLabProject {
        id,
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path_with_namespace: path.to_string(),
        created_at: Some("2023-06-01T00:00:00Z".to_string()),
    }
}

pub fn group(id: i64, name: &str, path: &str) -> GitLabGroup {
    GitLabGroup {
        id,
        name: name.to_string(),
        path: path.to_string(),
        full_path: Some(path.to_string()),
    }
}

/// RFC 3339 string `minutes` after [`BASE_TS`].
pub fn at(minutes: i64) -> String {
    chrono::DateTime::from_timestamp(BASE_TS + minutes * 60, 0)
        .expect("valid timestamp")
        .to_rfc3339()
}

/// An opened merge request created at [`BASE_TS`] and last updated `updated` minutes later.
pub fn merge_request(iid: i64, author: &str, updated: i64) -> GitLabMergeRequest {
    GitLabMergeRequest {
        id: 10_000 + iid,
        iid,
        project_id: PROJECT_ID,
        title: format!("Change {}", iid),
        state: "opened".to_string(),
        web_url: format!("https://gitlab.example.com/acme/api/-/merge_requests/{}", iid),
        created_at: at(0),
        updated_at: at(updated),
        merged_at: None,
        author: GitLabUser {
            id: author.len() as i64,
            username: author.to_string(),
        },
    }
}

pub fn merged(mut mr: GitLabMergeRequest, merged_after: i64) -> GitLabMergeRequest {
    mr.state = "merged".to_string();
    mr.merged_at = Some(at(merged_after));
    mr.updated_at = at(merged_after);
    mr
}

pub fn note(id: i64, minutes: i64, system: bool) -> GitLabNote {
    GitLabNote {
        id,
        created_at: at(minutes),
        system,
    }
}

pub async fn test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = db::initialize(&dir.path().join("test.db"))
        .await
        .expect("database initializes");
    (dir, pool)
}
