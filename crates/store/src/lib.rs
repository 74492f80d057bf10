//! On-disk persistence (spec §6 "On-disk state files"): the identity token
//! file, the pid file, the state snapshot, and the event-queue directory.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod identity;
mod pidfile;
mod queue;
mod snapshot;

pub use error::StoreError;
pub use pidfile::PidFile;
pub use queue::{EventQueue, QueuedEvent};
pub use snapshot::{current_boot_epoch, PersistedService, Snapshot, CURRENT_SNAPSHOT_VERSION};

pub mod identity_file {
    pub use crate::identity::{load_or_create, reset};
}
