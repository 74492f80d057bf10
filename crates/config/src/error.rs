//! Configuration errors (spec §7 "Configuration errors": fatal at load).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read control file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("failed to parse control file: {0}")]
    Parse(#[from] hcl::Error),
    #[error("service {0:?} is declared more than once")]
    DuplicateName(String),
    #[error("service {service:?} depends on undeclared service {dependency:?}")]
    UnresolvedDependency { service: String, dependency: String },
    #[error("service {service:?} rule has unknown kind {kind:?}")]
    UnknownRuleKind { service: String, kind: String },
    #[error("service {service:?} rule has unknown operator {operator:?}")]
    UnknownOperator { service: String, operator: String },
    #[error("service {service:?} action has unknown kind {kind:?}")]
    UnknownActionKind { service: String, kind: String },
    #[error("service {0:?} has unknown kind {1:?}")]
    UnknownServiceKind(String, String),
}
