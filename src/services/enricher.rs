//! Detail enrichment for merge requests that need (re)processing.
//!
//! Fetches every note and the approvals of one merge request and reduces
//! them to two timestamps: the first human comment and the first approval.

use crate::services::gitlab_client::{GitLabApprovalEvent, GitLabNote};
use crate::services::pagination;
use crate::services::source::MergeRequestSource;
use crate::time::parse_optional_timestamp;

/// Timestamps derived from a merge request's notes and approvals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MrDetails {
    /// Earliest non-system note (Unix).
    pub first_comment_at: Option<i64>,

    /// Earliest approval (Unix).
    pub approved_at: Option<i64>,
}

/// Earliest note written by a person rather than by GitLab.
pub fn first_human_comment_at(notes: &[GitLabNote]) -> Option<i64> {
    notes
        .iter()
        .filter(|note| !note.system)
        .filter_map(|note| parse_optional_timestamp(Some(&note.created_at)))
        .min()
}

/// Earliest approval event.
pub fn first_approval_at(events: &[GitLabApprovalEvent]) -> Option<i64> {
    events
        .iter()
        .filter_map(|event| parse_optional_timestamp(Some(&event.created_at)))
        .min()
}

/// Fetch notes and approvals for one merge request and derive its details.
///
/// Never fails: a broken note walk yields whatever notes were read, and a
/// failed approval fetch counts as no approvals.
pub async fn enrich<S: MergeRequestSource + ?Sized>(
    source: &S,
    project_id: i64,
    mr_iid: i64,
    per_page: u32,
) -> MrDetails {
    let label = format!("notes of !{} in project {}", mr_iid, project_id);
    let notes = pagination::fetch_all_pages(&label, per_page, move |page| {
        source.list_notes(project_id, mr_iid, page, per_page)
    })
    .await;

    let approvals = match source.list_approval_events(project_id, mr_iid).await {
        Ok(events) => events,
        Err(e) => {
            log::warn!(
                "Approvals unavailable for !{} in project {}, treating as none: {}",
                mr_iid,
                project_id,
                e
            );
            Vec::new()
        }
    };

    MrDetails {
        first_comment_at: first_human_comment_at(&notes),
        approved_at: first_approval_at(&approvals),
    }
}
