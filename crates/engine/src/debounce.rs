//! State Machine & Debouncer (spec §4.5).
//!
//! Each [`Event`] holds a rolling bitmap of the last 64 outcomes. A posted
//! outcome only becomes a [`Transition`] once the debounce threshold is
//! crossed, and the bitmap resets to the destination class on transition so
//! flapping doesn't cause an immediate re-transition.

use vigil_core::{Debounce, Event, Transition};

/// One rule evaluation's raw outcome, before debouncing. `changed` marks an
/// outcome spec §4.5 says always transitions regardless of the bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub failed: bool,
    pub changed: bool,
}

impl Outcome {
    pub fn ok() -> Self {
        Self { failed: false, changed: false }
    }

    pub fn fail() -> Self {
        Self { failed: true, changed: false }
    }

    pub fn changed() -> Self {
        Self { failed: true, changed: true }
    }
}

/// Posts one outcome to `event`, returning `Some(transition)` if this post
/// crosses the debounce threshold (spec §4.5). `first_post` suppresses the
/// very first observation from producing a visible event unless it already
/// carries a transition-worthy outcome (spec §4.5 "first posted outcome
/// also initializes the Event singleton"); a purely-successful first post
/// initializes the baseline state and emits nothing.
pub fn post(event: &mut Event, outcome: Outcome, debounce: Debounce, first_post: bool) -> Option<Transition> {
    let was_failing = event.transition.is_failure_class();
    event.bitmap.push(outcome.failed);

    if first_post {
        event.transition = Transition::Init;
        if !outcome.failed && !outcome.changed {
            return None;
        }
        return Some(Transition::Init);
    }

    if outcome.changed {
        event.bitmap = vigil_core::RollingBitmap::constant(outcome.failed);
        event.transition = Transition::Changed;
        return Some(Transition::Changed);
    }

    let destination_failing = outcome.failed;
    let threshold_met = event.bitmap.count_in_window(debounce.cycles, destination_failing) >= debounce.count;
    if !threshold_met {
        return None;
    }
    if destination_failing == was_failing {
        return None;
    }

    event.bitmap = vigil_core::RollingBitmap::constant(destination_failing);
    let transition = if destination_failing { Transition::Failed } else { Transition::Succeeded };
    event.transition = transition;
    Some(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{ActionBinding, EventKey, RuleKind, ServiceName};

    fn new_event() -> Event {
        let key = EventKey { service: ServiceName::new("web"), rule_kind: RuleKind::Port, binding_ordinal: 0 };
        Event::new(key, Transition::Succeeded, 0, String::new(), ActionBinding::default())
    }

    #[test]
    fn first_post_initializes_silently() {
        let mut ev = new_event();
        let t = post(&mut ev, Outcome::fail(), Debounce { cycles: 3, count: 2 }, true);
        assert_eq!(t, Some(Transition::Init));
    }

    #[test]
    fn first_post_of_a_successful_outcome_emits_nothing() {
        let mut ev = new_event();
        let t = post(&mut ev, Outcome::ok(), Debounce { cycles: 3, count: 2 }, true);
        assert_eq!(t, None);
    }

    #[test]
    fn debounced_alert_scenario_from_spec() {
        // cycles=3, count=2 — spec §8 scenario 3.
        let mut ev = new_event();
        let debounce = Debounce { cycles: 3, count: 2 };
        assert_eq!(post(&mut ev, Outcome::fail(), debounce, true), Some(Transition::Init));

        // cycle 2 fail -> transition to Failed (2 of last 3 now fail... but
        // only 2 posts so far; window counts whatever bits exist).
        let t2 = post(&mut ev, Outcome::fail(), debounce, false);
        assert_eq!(t2, Some(Transition::Failed));

        // cycle 3 fail -> no duplicate alert, still failing.
        let t3 = post(&mut ev, Outcome::fail(), debounce, false);
        assert_eq!(t3, None);

        // cycle 4 succeed -> still Failed (2 of last 3 still fail).
        let t4 = post(&mut ev, Outcome::ok(), debounce, false);
        assert_eq!(t4, None);

        // cycle 5 succeed -> now below threshold, Succeeded.
        let t5 = post(&mut ev, Outcome::ok(), debounce, false);
        assert_eq!(t5, Some(Transition::Succeeded));
    }

    #[test]
    fn changed_outcome_always_transitions() {
        let mut ev = new_event();
        let first = post(&mut ev, Outcome::ok(), Debounce { cycles: 3, count: 2 }, true);
        assert_eq!(first, None);
        let t = post(&mut ev, Outcome::changed(), Debounce { cycles: 3, count: 2 }, false);
        assert_eq!(t, Some(Transition::Changed));
    }

    #[test]
    fn no_transition_while_same_class_repeats() {
        let mut ev = new_event();
        let first = post(&mut ev, Outcome::ok(), Debounce { cycles: 1, count: 1 }, true);
        assert_eq!(first, None);
        let t = post(&mut ev, Outcome::ok(), Debounce { cycles: 1, count: 1 }, false);
        assert_eq!(t, None);
    }
}
