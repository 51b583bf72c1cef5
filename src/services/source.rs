//! The remote side of a sync.
//!
//! `GitLabClient` is the production implementation; tests drive the engine
//! with in-memory sources.

use crate::error::AppError;
use crate::services::gitlab_client::{
    GitLabApprovalEvent, GitLabGroup, GitLabMergeRequest, GitLabNote, GitLabProject,
};
use crate::services::pagination::PaginatedResponse;
use async_trait::async_trait;

/// Read-only access to the GitLab resources a sync needs.
#[async_trait]
pub trait MergeRequestSource: Send + Sync {
    /// Search groups by name or path.
    async fn list_groups(&self, search: &str) -> Result<Vec<GitLabGroup>, AppError>;

    /// All projects of a group, subgroups included.
    async fn list_group_projects(&self, group_id: i64) -> Result<Vec<GitLabProject>, AppError>;

    /// A single project by numeric ID or `namespace/path`.
    async fn get_project(&self, id_or_path: &str) -> Result<GitLabProject, AppError>;

    /// One page of a project's merge requests, in every state.
    async fn list_merge_requests(
        &self,
        project_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<PaginatedResponse<GitLabMergeRequest>, AppError>;

    /// One page of the notes on a merge request.
    async fn list_notes(
        &self,
        project_id: i64,
        mr_iid: i64,
        page: u32,
        per_page: u32,
    ) -> Result<PaginatedResponse<GitLabNote>, AppError>;

    /// Approvals given on a merge request. Missing data yields an empty list.
    async fn list_approval_events(
        &self,
        project_id: i64,
        mr_iid: i64,
    ) -> Result<Vec<GitLabApprovalEvent>, AppError>;
}
