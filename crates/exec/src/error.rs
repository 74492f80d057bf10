//! Error types for command construction and execution (spec §4.1).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("argv must not be empty")]
    EmptyArgv,
    #[error("uid/gid can only be set when the caller is root")]
    PrivilegeDropRequiresRoot,
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] nix::Error),
    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),
    #[error("exec failed: {0}")]
    Exec(#[source] nix::Error),
    #[error("wait failed: {0}")]
    Wait(#[source] nix::Error),
    #[error("signal delivery failed: {0}")]
    Signal(#[source] nix::Error),
    #[error("argument contains an embedded NUL byte: {0:?}")]
    InvalidArgv(String),
}
