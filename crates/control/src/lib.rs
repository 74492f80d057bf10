//! Control Surface: signal handling, `Run` flags, and the HTTP façade
//! (spec §4.8).

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod auth;
mod error;
mod http;
mod run;

pub use auth::{AccessLevel, AuthConfig};
pub use error::ControlError;
pub use http::{router, ControlState};
pub use run::{install_signal_handlers, Run};
