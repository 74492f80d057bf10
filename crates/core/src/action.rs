//! Actions and action bindings (spec §3 "ActionBinding").

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::simple_display;

/// What an Action does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Ignore,
    Alert,
    Restart,
    Stop,
    Exec,
    Unmonitor,
    Start,
    Monitor,
}

simple_display! {
    ActionKind {
        Ignore => "ignore",
        Alert => "alert",
        Restart => "restart",
        Stop => "stop",
        Exec => "exec",
        Unmonitor => "unmonitor",
        Start => "start",
        Monitor => "monitor",
    }
}

impl ActionKind {
    /// Encode as the `u32` tag used by the on-disk event-queue file format
    /// (spec §4.6 / §6). Stable across releases; never renumber existing
    /// variants.
    pub fn to_wire(self) -> u32 {
        match self {
            ActionKind::Ignore => 0,
            ActionKind::Alert => 1,
            ActionKind::Restart => 2,
            ActionKind::Stop => 3,
            ActionKind::Exec => 4,
            ActionKind::Unmonitor => 5,
            ActionKind::Start => 6,
            ActionKind::Monitor => 7,
        }
    }

    /// Decode from the wire tag. Unknown tags are rejected (spec §9 open
    /// question: implementers should reject unknown action kinds with a
    /// logged discard, rather than silently falling through to Alert).
    pub fn from_wire(tag: u32) -> Option<Self> {
        Some(match tag {
            0 => ActionKind::Ignore,
            1 => ActionKind::Alert,
            2 => ActionKind::Restart,
            3 => ActionKind::Stop,
            4 => ActionKind::Exec,
            5 => ActionKind::Unmonitor,
            6 => ActionKind::Start,
            7 => ActionKind::Monitor,
            _ => return None,
        })
    }
}

/// Debouncing parameters: "fire once `count` of the last `cycles` evaluations
/// were in this state".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debounce {
    pub cycles: u32,
    pub count: u32,
}

impl Default for Debounce {
    fn default() -> Self {
        // A bare rule with no explicit debounce fires on the very first
        // observation, matching Monit's default of cycles=1, count=1.
        Self { cycles: 1, count: 1 }
    }
}

/// A single action: what to run, as whom, with what timeout, debounced how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub command: Option<Vec<String>>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub debounce: Debounce,
    /// Re-fire `Exec` every `repeat`-th evaluation while the condition
    /// persists (spec §4.7). `None` means fire only on transition.
    pub repeat: Option<u32>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            command: None,
            uid: None,
            gid: None,
            timeout: Duration::from_secs(30),
            debounce: Debounce::default(),
            repeat: None,
        }
    }

    pub fn with_command(mut self, argv: Vec<String>) -> Self {
        self.command = Some(argv);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_debounce(mut self, cycles: u32, count: u32) -> Self {
        self.debounce = Debounce { cycles, count };
        self
    }
}

/// The failure/success pair attached to every Rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBinding {
    pub failure: Action,
    /// Success default is implicit `Alert`, suppressed in output (spec §3).
    pub success: Action,
}

impl Default for ActionBinding {
    fn default() -> Self {
        Self { failure: Action::new(ActionKind::Alert), success: Action::new(ActionKind::Alert) }
    }
}

impl ActionBinding {
    pub fn new(failure: Action, success: Action) -> Self {
        Self { failure, success }
    }

    /// True when the success leg is the implicit, suppressed default.
    pub fn success_is_implicit(&self) -> bool {
        self.success.kind == ActionKind::Alert && self.success.command.is_none()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_wire_roundtrip_is_stable() {
        for kind in [
            ActionKind::Ignore,
            ActionKind::Alert,
            ActionKind::Restart,
            ActionKind::Stop,
            ActionKind::Exec,
            ActionKind::Unmonitor,
            ActionKind::Start,
            ActionKind::Monitor,
        ] {
            assert_eq!(ActionKind::from_wire(kind.to_wire()), Some(kind));
        }
    }

    #[test]
    fn unknown_wire_tag_is_rejected() {
        assert_eq!(ActionKind::from_wire(99), None);
    }

    #[test]
    fn success_is_implicit_by_default() {
        let binding = ActionBinding::default();
        assert!(binding.success_is_implicit());
    }
}
