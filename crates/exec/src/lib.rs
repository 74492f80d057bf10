//! Child Execution: `build_command`/`execute` and the process liveness API
//! (spec §4.1).
//!
//! Uses raw fork/exec via `nix` rather than `std::process::Command` so the
//! child side can chdir, `setsid`, drop privileges with a verified readback,
//! and report `execve` failure over a controller pipe instead of a guessed
//! exit code. See module docs on `process` for the full child-side sequence.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod command;
mod env;
mod error;
mod pipes;
mod process;

pub use command::CommandTemplate;
pub use error::{CommandError, ExecuteError};
pub use process::{ExitOutcome, ProcessHandle, execute};
