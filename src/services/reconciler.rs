//! Change detection between a remote merge request and its stored copy.

use crate::models::merge_request::{MergeRequest, MergeRequestState};
use crate::services::gitlab_client::GitLabMergeRequest;
use crate::time::parse_iso_timestamp;
use serde::Serialize;

/// What the sync should do with one remote merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    /// Merged locally and still merged remotely; details are final.
    SkipTerminal,
    /// Stored `updated_at` and `state` match the remote.
    SkipUnchanged,
    /// Stored copy exists but differs.
    Update,
    /// Not stored yet.
    Insert,
}

impl SyncDecision {
    /// Whether notes and approvals must be fetched for this decision.
    pub fn needs_enrichment(self) -> bool {
        matches!(self, Self::Update | Self::Insert)
    }
}

/// Decide how to handle `remote` given the stored record, if any.
///
/// Only `updated_at` and `state` are compared. A title edit that leaves both
/// untouched is not picked up.
pub fn decide(remote: &GitLabMergeRequest, local: Option<&MergeRequest>) -> SyncDecision {
    let Some(local) = local else {
        return SyncDecision::Insert;
    };

    let remote_state = MergeRequestState::from(remote.state.as_str());
    if local.state_enum().is_terminal() && remote_state.is_terminal() {
        return SyncDecision::SkipTerminal;
    }

    if local.updated_at == parse_iso_timestamp(&remote.updated_at) && local.state == remote.state {
        SyncDecision::SkipUnchanged
    } else {
        SyncDecision::Update
    }
}
