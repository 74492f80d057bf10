//! Errors raised by graph traversal (spec §4.4).

use thiserror::Error;
use vigil_core::ServiceName;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("service {0} is not declared in the graph")]
    Missing(ServiceName),
    #[error("dependency cycle detected while traversing from {0}")]
    Cycle(ServiceName),
}
