//! Service: the named check target (spec §3 "Service").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::action::ActionKind;
use crate::event::{Event, EventKey};
use crate::rule::{Rule, RuleKind};
use crate::simple_display;

/// Unique, user-declared service name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for ServiceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What kind of OS resource a Service checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    System,
    Process,
    File,
    Directory,
    Fifo,
    Filesystem,
    Network,
    Host,
    Program,
}

simple_display! {
    ServiceKind {
        System => "system",
        Process => "process",
        File => "file",
        Directory => "directory",
        Fifo => "fifo",
        Filesystem => "filesystem",
        Network => "network",
        Host => "host",
        Program => "program",
    }
}

/// Whether a Service is actively checked by the scheduler or only reachable
/// for administrative queries/actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorMode {
    Active,
    Passive,
}

/// The monitoring lifecycle state (spec §3 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    NotMonitored,
    Init,
    Waiting,
    Yes,
}

simple_display! {
    MonitorState {
        NotMonitored => "not monitored",
        Init => "initializing",
        Waiting => "waiting",
        Yes => "running",
    }
}

/// Compact bitset over `RuleKind`, used for the Service's error/error-hint
/// bitmaps (spec §3: "error bitmap (which rule-kinds currently fail)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleKindBits(u32);

impl RuleKindBits {
    fn index(kind: RuleKind) -> u32 {
        // Stable ordinal matching declaration order in `RuleKind`.
        kind as u32
    }

    pub fn set(&mut self, kind: RuleKind) {
        self.0 |= 1 << Self::index(kind);
    }

    pub fn clear(&mut self, kind: RuleKind) {
        self.0 &= !(1 << Self::index(kind));
    }

    pub fn is_set(&self, kind: RuleKind) -> bool {
        self.0 & (1 << Self::index(kind)) != 0
    }

    pub fn any(&self) -> bool {
        self.0 != 0
    }

    /// Raw bitset, for persisting to the state snapshot.
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// Pending administrative action queued by the Control Surface, drained by
/// the next cycle (spec §3, §4.8).
pub type PendingAction = Option<ActionKind>;

/// A declared monitoring target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub name: ServiceName,
    pub kind: ServiceKind,
    pub path: Option<String>,
    pub mode: MonitorMode,
    pub state: MonitorState,
    pub pending_action: PendingAction,
    pub error_bits: RuleKindBits,
    pub error_hint_bits: RuleKindBits,
    pub collected_at_epoch: u64,
    pub dependants: Vec<ServiceName>,
    pub rules: Vec<Rule>,
    pub mail_targets: Vec<String>,
    pub pid: Option<i32>,
    pub events: HashMap<EventKey, Event>,
    pub start_command: Option<Vec<String>>,
    pub stop_command: Option<Vec<String>>,
    pub restart_command: Option<Vec<String>>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Service {
    pub fn new(name: ServiceName, kind: ServiceKind) -> Self {
        Self {
            name,
            kind,
            path: None,
            mode: MonitorMode::Active,
            state: MonitorState::Init,
            pending_action: None,
            error_bits: RuleKindBits::default(),
            error_hint_bits: RuleKindBits::default(),
            collected_at_epoch: 0,
            dependants: Vec::new(),
            rules: Vec::new(),
            mail_targets: Vec::new(),
            pid: None,
            events: HashMap::new(),
            start_command: None,
            stop_command: None,
            restart_command: None,
            uid: None,
            gid: None,
        }
    }

    /// A `NotMonitored` service is skipped by the Scheduler but remains
    /// reachable by the Control Surface (spec §3 invariants).
    pub fn is_scheduled(&self) -> bool {
        self.state != MonitorState::NotMonitored
    }

    pub fn is_monitored(&self) -> bool {
        matches!(self.state, MonitorState::Init | MonitorState::Waiting | MonitorState::Yes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_monitored_is_not_scheduled_but_exists() {
        let mut svc = Service::new(ServiceName::new("web"), ServiceKind::Process);
        svc.state = MonitorState::NotMonitored;
        assert!(!svc.is_scheduled());
    }

    #[test]
    fn rule_kind_bits_set_clear_roundtrip() {
        let mut bits = RuleKindBits::default();
        assert!(!bits.is_set(RuleKind::Cpu));
        bits.set(RuleKind::Cpu);
        assert!(bits.is_set(RuleKind::Cpu));
        assert!(bits.any());
        bits.clear(RuleKind::Cpu);
        assert!(!bits.is_set(RuleKind::Cpu));
        assert!(!bits.any());
    }
}
