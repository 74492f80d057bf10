//! Worker Dispatcher and Task Scheduler (spec §4.2, §4.3).
//!
//! Deliberately built on `std::thread` + `parking_lot::Mutex`/`Condvar`
//! rather than tokio: the spec's contract for this subsystem is a CAS
//! in-progress flag and a condvar-driven thread pool, ported directly from
//! libmonit's `Dispatcher.c`/`Scheduler.c`, not an async reactor.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod dispatcher;
mod scheduler;
mod task;

pub use dispatcher::Dispatcher;
pub use scheduler::{ScheduledTask, Scheduler};
pub use task::{TaskKind, TaskState};
