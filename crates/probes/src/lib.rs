//! Probe and collector collaborators (spec §1: "per-protocol probe logic …
//! and platform-specific resource collectors … are out of scope", each
//! specified only through a `check(socket) -> ok | fails(reason)` or
//! `sample() -> snapshot` interface). This crate provides those interfaces,
//! one fully working instance of each (a TCP-connect probe, a Linux `/proc`
//! process collector, and a `statvfs`-backed filesystem collector), and stub
//! instances for everything else the Rule Graph can reference.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod filesystem;
mod probe;
mod process;

pub use error::ProbeError;
pub use filesystem::{FilesystemCollector, FilesystemSnapshot, LinuxFilesystemCollector};
pub use probe::{Probe, StubProtocolProbe, TcpConnectProbe};
pub use process::{clock_ticks_per_sec, cpu_percent_between, LinuxProcessCollector, ProcessCollector, ProcessSnapshot};
