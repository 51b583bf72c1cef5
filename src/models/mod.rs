//! Data models for the local SQLite mirror.
//!
//! Each model derives `FromRow` for SQLx queries and `Serialize` so the CLI
//! can print it as JSON. Store operations live next to the model they read
//! and write.

pub mod merge_request;
pub mod project;
pub mod sync_log;

pub use merge_request::{MergeRequest, MergeRequestState};
pub use project::Project;
pub use sync_log::{LogStatus, NewLogEntry, SyncLogEntry};
