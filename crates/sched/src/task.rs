//! Task kinds and lifecycle state (spec §4.3 "Task kinds").

use std::time::Duration;

/// What schedules a Task to fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskKind {
    /// Fires once `offset` after start/restart; auto-cancels unless the
    /// worker calls `restart` before returning.
    OneShot { offset: Duration },
    /// Fires at `offset` after start, then every `interval` thereafter.
    Periodic { offset: Duration, interval: Duration },
    /// Fires once at the given wall-clock instant; auto-cancels like
    /// `OneShot`.
    At { unix_time: u64 },
}

impl TaskKind {
    pub(crate) fn auto_cancels(self) -> bool {
        matches!(self, TaskKind::OneShot { .. } | TaskKind::At { .. })
    }
}

/// The lifecycle state of a `ScheduledTask` slot (spec §4.3 "Dispatch
/// algorithm").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Initial,
    Started,
    Canceled,
    /// The worker is running a `OneShot`/`At` task; it will be canceled on
    /// completion unless `restart` is called from inside the callback.
    Limbo,
}
