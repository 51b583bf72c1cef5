//! Incremental merge request sync.
//!
//! For each project the engine:
//! - Upserts the project row
//! - Walks every merge request page (all states)
//! - Compares each merge request with its stored copy
//! - Fetches notes and approvals only for new or changed merge requests
//! - Upserts the result immediately, one merge request at a time
//!
//! Remote failures shorten the walk but never abort it. A store failure for
//! one merge request is reported and the rest of the batch still runs.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::merge_request::{self as mr_store, MergeRequest};
use crate::models::project::{self, Project};
use crate::models::sync_log::{self, LogStatus, NewLogEntry};
use crate::services::enricher::{self, MrDetails};
use crate::services::gitlab_client::{GitLabGroup, GitLabMergeRequest, GitLabProject};
use crate::services::pagination;
use crate::services::reconciler::{self, SyncDecision};
use crate::services::source::MergeRequestSource;
use crate::time::{now, parse_iso_timestamp, parse_optional_timestamp};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Default page size for merge request and note walks.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Largest page size GitLab accepts.
pub const MAX_PER_PAGE: u32 = 100;

/// Sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Items requested per page.
    pub per_page: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl SyncConfig {
    /// Page size clamped to what GitLab accepts.
    pub fn page_size(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }
}

/// Result of a sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Projects visited.
    pub projects: i64,

    /// Merge requests returned by the remote.
    pub fetched: i64,

    pub inserted: i64,
    pub updated: i64,
    pub skipped_terminal: i64,
    pub skipped_unchanged: i64,

    /// Per-record or per-project failures.
    pub errors: Vec<String>,

    /// Duration of the run in milliseconds.
    pub duration_ms: i64,
}

impl SyncReport {
    /// Fold another report's counters and errors into this one.
    fn absorb(&mut self, other: SyncReport) {
        self.projects += other.projects;
        self.fetched += other.fetched;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped_terminal += other.skipped_terminal;
        self.skipped_unchanged += other.skipped_unchanged;
        self.errors.extend(other.errors);
    }

    fn record(&mut self, decision: SyncDecision) {
        match decision {
            SyncDecision::SkipTerminal => self.skipped_terminal += 1,
            SyncDecision::SkipUnchanged => self.skipped_unchanged += 1,
            SyncDecision::Update => self.updated += 1,
            SyncDecision::Insert => self.inserted += 1,
        }
    }

    /// Whether every merge request was processed without error.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Mirrors merge requests from a [`MergeRequestSource`] into the store.
pub struct SyncEngine<S> {
    /// Database connection pool.
    pool: DbPool,

    /// Remote side.
    source: S,

    config: SyncConfig,
}

impl<S: MergeRequestSource> SyncEngine<S> {
    /// Create a new sync engine.
    pub fn new(pool: DbPool, source: S, config: SyncConfig) -> Self {
        Self {
            pool,
            source,
            config,
        }
    }

    /// The remote this engine reads from.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Sync every project of the group matching `search`.
    pub async fn sync_group(&self, search: &str) -> Result<SyncReport, AppError> {
        let start = Instant::now();

        let groups = self.source.list_groups(search).await?;
        let group = resolve_group(&groups, search)
            .ok_or_else(|| AppError::not_found_with_id("group", search))?;
        log::info!("Syncing group {} (id={})", group.name, group.id);

        let projects = self.source.list_group_projects(group.id).await?;
        log::info!("Found {} project(s) in {}", projects.len(), group.name);

        let mut report = SyncReport::default();
        for project in &projects {
            match self.sync_project(project).await {
                Ok(project_report) => report.absorb(project_report),
                Err(e) => {
                    log::error!("Project {} failed: {}", project.path_with_namespace, e);
                    report
                        .errors
                        .push(format!("Project {}: {}", project.path_with_namespace, e));
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as i64;
        Ok(report)
    }

    /// Sync a single project given its numeric ID or `namespace/path`.
    pub async fn sync_project_by_ref(&self, id_or_path: &str) -> Result<SyncReport, AppError> {
        let project = self.source.get_project(id_or_path).await?;
        self.sync_project(&project).await
    }

    /// Sync all merge requests of one project.
    ///
    /// Errors only when the project row itself cannot be written.
    pub async fn sync_project(&self, remote_project: &GitLabProject) -> Result<SyncReport, AppError> {
        let start = Instant::now();
        let project_id = remote_project.id;
        let per_page = self.config.page_size();

        project::upsert_project(&self.pool, &to_project(remote_project))
            .await
            .map_err(|e| AppError::database_with_op(e.to_string(), "upsert_project"))?;

        let label = format!("merge requests of {}", remote_project.path_with_namespace);
        let source = &self.source;
        let remote_mrs = pagination::fetch_all_pages(&label, per_page, move |page| {
            source.list_merge_requests(project_id, page, per_page)
        })
        .await;

        log::info!(
            "Fetched {} merge request(s) for {}",
            remote_mrs.len(),
            remote_project.path_with_namespace
        );

        let mut report = SyncReport {
            projects: 1,
            fetched: remote_mrs.len() as i64,
            ..Default::default()
        };

        for remote in &remote_mrs {
            match self.sync_mr(project_id, remote).await {
                Ok(decision) => {
                    log::debug!("!{} in project {}: {:?}", remote.iid, project_id, decision);
                    report.record(decision);
                }
                Err(e) => {
                    let err = AppError::sync_for_mr(format!("MR !{}: {}", remote.iid, e), remote.id);
                    log::error!("Project {}: {}", project_id, err);
                    self.log_sync_operation(NewLogEntry {
                        operation: "sync_mr",
                        status: LogStatus::Error,
                        project_id: Some(project_id),
                        mr_id: Some(remote.id),
                        message: Some(e.to_string()),
                        duration_ms: None,
                    })
                    .await;
                    report.errors.push(err.to_string());
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as i64;

        log::info!(
            "Synced {}: {} inserted, {} updated, {} unchanged, {} merged skipped, {} error(s)",
            remote_project.path_with_namespace,
            report.inserted,
            report.updated,
            report.skipped_unchanged,
            report.skipped_terminal,
            report.errors.len()
        );

        self.log_sync_operation(NewLogEntry {
            operation: "sync_complete",
            status: if report.is_clean() {
                LogStatus::Success
            } else {
                LogStatus::Partial
            },
            project_id: Some(project_id),
            mr_id: None,
            message: Some(format!(
                "Fetched {}, inserted {}, updated {}, skipped {}",
                report.fetched,
                report.inserted,
                report.updated,
                report.skipped_terminal + report.skipped_unchanged
            )),
            duration_ms: Some(report.duration_ms),
        })
        .await;

        Ok(report)
    }

    /// Reconcile one merge request and persist it if needed.
    async fn sync_mr(
        &self,
        project_id: i64,
        remote: &GitLabMergeRequest,
    ) -> Result<SyncDecision, AppError> {
        let local = mr_store::get_merge_request(&self.pool, project_id, remote.id)
            .await
            .map_err(|e| AppError::database_with_op(e.to_string(), "get_merge_request"))?;

        let decision = reconciler::decide(remote, local.as_ref());
        if !decision.needs_enrichment() {
            return Ok(decision);
        }

        let details =
            enricher::enrich(&self.source, project_id, remote.iid, self.config.page_size()).await;

        let squad = local.and_then(|l| l.squad);
        let record = to_record(project_id, remote, details, squad, now());

        mr_store::upsert_merge_request(&self.pool, &record)
            .await
            .map_err(|e| AppError::database_with_op(e.to_string(), "upsert_merge_request"))?;

        Ok(decision)
    }

    /// Write a sync log row; failures here are only logged.
    async fn log_sync_operation(&self, entry: NewLogEntry<'_>) {
        if let Err(e) = sync_log::insert_log(&self.pool, &entry, now()).await {
            log::warn!("Failed to write sync log entry {}: {}", entry.operation, e);
        }
    }
}

/// Pick the group a search refers to: an exact path or name match if there
/// is one, otherwise the first result.
pub fn resolve_group<'a>(groups: &'a [GitLabGroup], search: &str) -> Option<&'a GitLabGroup> {
    groups
        .iter()
        .find(|g| {
            g.full_path.as_deref() == Some(search)
                || g.path.eq_ignore_ascii_case(search)
                || g.name.eq_ignore_ascii_case(search)
        })
        .or_else(|| groups.first())
}

fn to_project(remote: &GitLabProject) -> Project {
    Project {
        id: remote.id,
        name: remote.name.clone(),
        path_with_namespace: remote.path_with_namespace.clone(),
        created_at: parse_optional_timestamp(remote.created_at.as_deref()),
    }
}

/// Build the row written for a new or changed merge request.
fn to_record(
    project_id: i64,
    remote: &GitLabMergeRequest,
    details: MrDetails,
    squad: Option<String>,
    cached_at: i64,
) -> MergeRequest {
    MergeRequest {
        id: remote.id,
        project_id,
        iid: remote.iid,
        title: remote.title.clone(),
        web_url: remote.web_url.clone(),
        state: remote.state.clone(),
        author_id: remote.author.id,
        author_username: remote.author.username.clone(),
        created_at: parse_iso_timestamp(&remote.created_at),
        updated_at: parse_iso_timestamp(&remote.updated_at),
        first_comment_at: details.first_comment_at,
        approved_at: details.approved_at,
        merged_at: parse_optional_timestamp(remote.merged_at.as_deref()),
        squad,
        cached_at,
    }
}
