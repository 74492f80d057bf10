//! Errors raised by the Control Surface (spec §4.8).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("signal registration failed: {0}")]
    Signal(#[source] std::io::Error),

    #[error("unknown service {0}")]
    UnknownService(String),

    #[error("unrecognized action {0}")]
    UnknownAction(String),

    #[error("graph error: {0}")]
    Graph(#[from] vigil_rules::GraphError),
}
