//! Events emitted by the State Machine (spec §3 "Event", §4.5, §4.6).

use serde::{Deserialize, Serialize};

use crate::action::ActionBinding;
use crate::bitmap::RollingBitmap;
use crate::rule::RuleKind;
use crate::service::ServiceName;
use crate::simple_display;

/// The observed transition reported by one rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Failed,
    Succeeded,
    Changed,
    ChangedNot,
    Init,
}

simple_display! {
    Transition {
        Failed => "failed",
        Succeeded => "succeeded",
        Changed => "changed",
        ChangedNot => "changed_not",
        Init => "init",
    }
}

impl Transition {
    /// The debounce "destination class" a transition belongs to: true means
    /// the failed/changed class, false means the succeeded/ok class.
    pub fn is_failure_class(self) -> bool {
        matches!(self, Transition::Failed | Transition::Changed)
    }

    /// `Instance` and `Action` events (and `Init`) always transition,
    /// bypassing the cycles/count threshold (spec §4.5).
    pub fn always_transitions(self) -> bool {
        matches!(self, Transition::Changed | Transition::Init)
    }

    /// Encode as the `u32` tag used by the on-disk event-queue file format
    /// (spec §4.6 / §6). Stable across releases, mirrors `ActionKind::to_wire`.
    pub fn to_wire(self) -> u32 {
        match self {
            Transition::Failed => 0,
            Transition::Succeeded => 1,
            Transition::Changed => 2,
            Transition::ChangedNot => 3,
            Transition::Init => 4,
        }
    }

    pub fn from_wire(tag: u32) -> Option<Self> {
        Some(match tag {
            0 => Transition::Failed,
            1 => Transition::Succeeded,
            2 => Transition::Changed,
            3 => Transition::ChangedNot,
            4 => Transition::Init,
            _ => return None,
        })
    }
}

/// Out-of-band delivery handlers an Event can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryHandler {
    Alert,
    MMonit,
}

/// Per-handler delivery bits: whether the handler still needs to be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeliveryFlags {
    pub alert_pending: bool,
    pub mmonit_pending: bool,
}

impl DeliveryFlags {
    pub fn any_pending(&self) -> bool {
        self.alert_pending || self.mmonit_pending
    }

    pub fn mark_pending(&mut self, handler: DeliveryHandler) {
        match handler {
            DeliveryHandler::Alert => self.alert_pending = true,
            DeliveryHandler::MMonit => self.mmonit_pending = true,
        }
    }

    pub fn mark_delivered(&mut self, handler: DeliveryHandler) {
        match handler {
            DeliveryHandler::Alert => self.alert_pending = false,
            DeliveryHandler::MMonit => self.mmonit_pending = false,
        }
    }
}

/// Identifies an Event uniquely within a Service: events are singleton per
/// (rule-kind, ActionBinding) pair (spec §3 invariants).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub service: ServiceName,
    pub rule_kind: RuleKind,
    /// Distinguishes multiple rules of the same kind on one service (e.g.
    /// two `content` rules with different patterns); index into the
    /// service's rule list at the time the rule was declared.
    pub binding_ordinal: u32,
}

/// The record of a state transition for one (Service, rule) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub key: EventKey,
    pub transition: Transition,
    pub collected_at_epoch: u64,
    pub message: String,
    pub binding: ActionBinding,
    pub bitmap: RollingBitmap,
    pub delivery: DeliveryFlags,
    pub repeat_counter: u32,
}

impl Event {
    pub fn new(key: EventKey, transition: Transition, collected_at_epoch: u64, message: String, binding: ActionBinding) -> Self {
        Self {
            key,
            transition,
            collected_at_epoch,
            message,
            binding,
            bitmap: RollingBitmap::new(),
            delivery: DeliveryFlags::default(),
            repeat_counter: 0,
        }
    }

    /// The Action to invoke for this transition: failure-action on
    /// {Failed, Changed, Init}, success-action on {Succeeded, ChangedNot}
    /// (spec §4.6 step 3).
    pub fn selected_action(&self) -> &crate::action::Action {
        match self.transition {
            Transition::Failed | Transition::Changed | Transition::Init => &self.binding.failure,
            Transition::Succeeded | Transition::ChangedNot => &self.binding.success,
        }
    }

    /// The log level spec §4.6 step 1 assigns to this transition.
    pub fn log_level(&self) -> EventLogLevel {
        match self.transition {
            Transition::Init => EventLogLevel::Silent,
            Transition::Failed => EventLogLevel::Error,
            Transition::Changed => EventLogLevel::Warning,
            Transition::Succeeded | Transition::ChangedNot => EventLogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLogLevel {
    Silent,
    Info,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionBinding;

    fn key() -> EventKey {
        EventKey { service: ServiceName::new("db"), rule_kind: RuleKind::Port, binding_ordinal: 0 }
    }

    #[test]
    fn selected_action_picks_failure_leg_on_failed() {
        let ev = Event::new(key(), Transition::Failed, 0, "down".into(), ActionBinding::default());
        assert_eq!(ev.selected_action().kind, ev.binding.failure.kind);
    }

    #[test]
    fn selected_action_picks_success_leg_on_succeeded() {
        let ev = Event::new(key(), Transition::Succeeded, 0, "up".into(), ActionBinding::default());
        assert_eq!(ev.selected_action().kind, ev.binding.success.kind);
    }

    #[test]
    fn transition_wire_roundtrip_is_stable() {
        for t in [Transition::Failed, Transition::Succeeded, Transition::Changed, Transition::ChangedNot, Transition::Init] {
            assert_eq!(Transition::from_wire(t.to_wire()), Some(t));
        }
        assert_eq!(Transition::from_wire(99), None);
    }

    #[test]
    fn init_is_silent_and_always_transitions() {
        assert_eq!(Transition::Init.always_transitions(), true);
        let ev = Event::new(key(), Transition::Init, 0, "".into(), ActionBinding::default());
        assert_eq!(ev.log_level(), EventLogLevel::Silent);
    }
}
