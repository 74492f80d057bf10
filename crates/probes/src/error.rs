//! Errors raised by probes and collectors (spec §7 "Resource-sampling
//! errors": never fatal, translated into the rule-kind's Failed outcome by
//! the caller).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("failed to read {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("could not parse {what} from {path}")]
    Parse { what: &'static str, path: String },
    #[error("protocol probe {0} is not implemented in this build")]
    NotImplemented(&'static str),
    #[error("no process found for pid {0}")]
    NoSuchProcess(i32),
}
