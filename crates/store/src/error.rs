//! Errors raised by persistence (spec §6 "On-disk state files").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event queue file {0} is truncated")]
    Truncated(String),
    #[error("event queue file {path} has version {found}, binary is {expected}")]
    VersionMismatch { path: String, found: u32, expected: u32 },
    #[error("event queue is full ({slots} slots)")]
    QueueFull { slots: usize },
    #[error("pid file {0} is held by another process")]
    AlreadyLocked(String),
}
