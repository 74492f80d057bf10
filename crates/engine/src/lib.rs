//! State Machine & Debouncer, Event Engine, and Action Engine (spec §4.5,
//! §4.6, §4.7) — the three components that turn a Rule Graph walk into
//! posted events and spawned children. Ties together `vigil-exec`,
//! `vigil-rules`, `vigil-probes`, and `vigil-store`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod action_engine;
mod debounce;
mod delivery;
mod error;
mod event_engine;

pub use action_engine::{ActionEngine, ActionOutcome};
pub use debounce::{post, Outcome};
pub use delivery::{DeliveryChannel, DeliveryOutcome, LogAlertChannel};
pub use error::EngineError;
pub use event_engine::{any_error, EventEngine, PostedEvent};

#[cfg(any(test, feature = "test-support"))]
pub use delivery::fake;
