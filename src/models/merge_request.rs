//! Merge request model and its store operations.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a merge request.
///
/// GitLab may introduce states this tool does not know about; those are kept
/// verbatim in `Other` so they round-trip to the store unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeRequestState {
    Opened,
    Merged,
    Closed,
    #[serde(untagged)]
    Other(String),
}

impl MergeRequestState {
    /// The string stored in the `state` column.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Opened => "opened",
            Self::Merged => "merged",
            Self::Closed => "closed",
            Self::Other(s) => s,
        }
    }

    /// Whether no further detail re-fetch should happen.
    pub fn is_terminal(&self) -> bool {
        *self == Self::Merged
    }
}

impl From<&str> for MergeRequestState {
    fn from(s: &str) -> Self {
        match s {
            "opened" => Self::Opened,
            "merged" => Self::Merged,
            "closed" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for MergeRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mirrored merge request.
///
/// All timestamps are Unix seconds. `first_comment_at` and `approved_at` are
/// derived during sync; `squad` is owned by the squad assignment batch and is
/// never cleared or replaced by [`upsert_merge_request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MergeRequest {
    /// GitLab MR ID (global).
    pub id: i64,

    /// GitLab project ID.
    pub project_id: i64,

    /// Project-scoped MR number.
    pub iid: i64,

    pub title: String,

    /// URL to MR in GitLab web UI.
    pub web_url: String,

    /// Raw state string: `opened`, `merged`, `closed`, or anything newer.
    pub state: String,

    pub author_id: i64,
    pub author_username: String,

    pub created_at: i64,
    pub updated_at: i64,

    /// Earliest non-system note.
    pub first_comment_at: Option<i64>,

    /// Earliest approval.
    pub approved_at: Option<i64>,

    pub merged_at: Option<i64>,

    /// Classification label assigned out-of-band.
    pub squad: Option<String>,

    /// When this row was last written by a sync (Unix).
    pub cached_at: i64,
}

impl MergeRequest {
    /// Parse the state string into an enum.
    pub fn state_enum(&self) -> MergeRequestState {
        MergeRequestState::from(self.state.as_str())
    }
}

const SELECT_COLUMNS: &str = "id, project_id, iid, title, web_url, state, author_id, author_username,
    created_at, updated_at, first_comment_at, approved_at, merged_at, squad, cached_at";

/// Look up a merge request by its composite key.
pub async fn get_merge_request(
    pool: &sqlx::SqlitePool,
    project_id: i64,
    id: i64,
) -> Result<Option<MergeRequest>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM merge_requests WHERE project_id = ? AND id = ?",
        SELECT_COLUMNS
    );

    sqlx::query_as::<_, MergeRequest>(&query)
        .bind(project_id)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// List the merge requests of a project, newest first.
pub async fn list_merge_requests(
    pool: &sqlx::SqlitePool,
    project_id: i64,
) -> Result<Vec<MergeRequest>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM merge_requests WHERE project_id = ? ORDER BY created_at DESC, id DESC",
        SELECT_COLUMNS
    );

    sqlx::query_as::<_, MergeRequest>(&query)
        .bind(project_id)
        .fetch_all(pool)
        .await
}

/// Insert a merge request or replace it on `(id, project_id)` conflict.
///
/// A squad already stored on the row always wins over the incoming value,
/// so a sync carrying `squad: None` cannot erase an assignment.
pub async fn upsert_merge_request(
    pool: &sqlx::SqlitePool,
    mr: &MergeRequest,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO merge_requests (
            id, project_id, iid, title, web_url, state, author_id, author_username,
            created_at, updated_at, first_comment_at, approved_at, merged_at, squad, cached_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id, project_id) DO UPDATE SET
            iid = excluded.iid,
            title = excluded.title,
            web_url = excluded.web_url,
            state = excluded.state,
            author_id = excluded.author_id,
            author_username = excluded.author_username,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            first_comment_at = excluded.first_comment_at,
            approved_at = excluded.approved_at,
            merged_at = excluded.merged_at,
            squad = COALESCE(merge_requests.squad, excluded.squad),
            cached_at = excluded.cached_at
        "#,
    )
    .bind(mr.id)
    .bind(mr.project_id)
    .bind(mr.iid)
    .bind(&mr.title)
    .bind(&mr.web_url)
    .bind(&mr.state)
    .bind(mr.author_id)
    .bind(&mr.author_username)
    .bind(mr.created_at)
    .bind(mr.updated_at)
    .bind(mr.first_comment_at)
    .bind(mr.approved_at)
    .bind(mr.merged_at)
    .bind(&mr.squad)
    .bind(mr.cached_at)
    .execute(pool)
    .await?;

    Ok(())
}
