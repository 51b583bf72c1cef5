//! MR Insights - incremental GitLab merge request mirror.
//!
//! Mirrors merge requests of a GitLab group into a local SQLite database and
//! reports review latency (time to first comment, approval and merge) per
//! squad. The binary in `main.rs` is a thin CLI over this library.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time;

pub use config::AppConfig;
pub use error::AppError;
