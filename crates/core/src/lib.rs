//! vigil-core: data model shared by every other Vigil crate.
//!
//! This crate owns no I/O. It defines the Service/Rule/Event/ActionBinding
//! types the rest of the workspace operates on, plus the `Clock` abstraction
//! used to keep the scheduler and debouncer testable without real sleeps.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod action;
pub mod bitmap;
pub mod clock;
pub mod event;
pub mod macros;
pub mod rule;
pub mod service;

pub use action::{Action, ActionBinding, ActionKind, Debounce};
pub use bitmap::RollingBitmap;
pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{DeliveryFlags, DeliveryHandler, Event, EventKey, Transition};
pub use rule::{Operator, Rule, RuleKind, Threshold};
pub use service::{MonitorMode, MonitorState, RuleKindBits, Service, ServiceKind, ServiceName};
