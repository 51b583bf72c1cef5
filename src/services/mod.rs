//! Business logic services.
//!
//! The sync pipeline is split into small pieces so each can be tested on its
//! own: the walker drains pages, the reconciler decides, the enricher fetches
//! details, and the engine ties them to the store. Analytics and squad
//! assignment only read or label what the sync stored.

pub mod analytics;
pub mod enricher;
pub mod gitlab_client;
pub mod pagination;
pub mod reconciler;
pub mod source;
pub mod squads;
pub mod sync_engine;

pub use gitlab_client::GitLabClient;
pub use source::MergeRequestSource;
pub use sync_engine::{SyncConfig, SyncEngine, SyncReport};
