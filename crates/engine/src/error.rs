//! Errors raised across the State Machine, Event Engine, and Action Engine
//! (spec §4.5-§4.7).

use thiserror::Error;
use vigil_core::ServiceName;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("graph error: {0}")]
    Graph(#[from] vigil_rules::GraphError),

    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    #[error("service {0} not found")]
    UnknownService(ServiceName),

    #[error("action on {service} timed out after {timeout_ms}ms")]
    ActionTimedOut { service: ServiceName, timeout_ms: u64 },

    #[error("exec error: {0}")]
    Exec(#[from] vigil_exec::ExecuteError),

    #[error("command build error: {0}")]
    Command(#[from] vigil_exec::CommandError),

    #[error("service {0} has no {1} command configured")]
    MissingCommand(ServiceName, &'static str),
}
