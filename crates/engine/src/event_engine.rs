//! Event Engine: delivery pipeline and queue replay (spec §4.6).

use vigil_core::{DeliveryHandler, Event, RuleKindBits, Service, Transition};
use vigil_store::EventQueue;

use crate::delivery::{DeliveryChannel, DeliveryOutcome};
use crate::error::EngineError;

/// What the caller should do next with the selected Action (spec §4.6 step
/// 3: "Invoke the Action Engine with the selected Action"). The Event
/// Engine decides *that* an action fires; the Action Engine decides *how*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostedEvent {
    pub transition: Transition,
}

pub struct EventEngine<A, M> {
    alert: A,
    mmonit: Option<M>,
    queue: Option<EventQueue>,
}

impl<A: DeliveryChannel, M: DeliveryChannel> EventEngine<A, M> {
    pub fn new(alert: A, mmonit: Option<M>, queue: Option<EventQueue>) -> Self {
        Self { alert, mmonit, queue }
    }

    /// Runs the delivery pipeline for one transitioned Event against its
    /// owning Service (spec §4.6 steps 1-5). Returns the `PostedEvent` the
    /// Action Engine should act on.
    pub fn deliver(&self, service: &mut Service, event: &mut Event, message: &str, now_epoch: u64) -> Result<PostedEvent, EngineError> {
        self.update_error_bits(service, event.key.rule_kind, event.transition);

        event.message = message.to_string();
        event.collected_at_epoch = now_epoch;

        if event.delivery.any_pending() || self.needs_delivery(event.transition) {
            event.delivery.mark_pending(DeliveryHandler::Alert);
            if self.mmonit.is_some() {
                event.delivery.mark_pending(DeliveryHandler::MMonit);
            }
        }

        self.attempt_deliveries(&service.name.clone(), event, message);

        if event.delivery.any_pending() {
            if let Some(queue) = &self.queue {
                let action_kind = event.selected_action().kind;
                if queue.persist(service.name.as_str(), event, message, action_kind, now_epoch)?.is_none() {
                    tracing::error!(service = %service.name, "event queue full, dropping event");
                }
            }
        }

        Ok(PostedEvent { transition: event.transition })
    }

    fn needs_delivery(&self, transition: Transition) -> bool {
        // Silent (Init) transitions never alert; every other transition at
        // least attempts delivery once (spec §4.6 step 1/4).
        transition != Transition::Init
    }

    fn update_error_bits(&self, service: &mut Service, rule_kind: vigil_core::RuleKind, transition: Transition) {
        match transition {
            Transition::Failed => {
                service.error_bits.set(rule_kind);
                service.error_hint_bits.clear(rule_kind);
            }
            Transition::Changed => {
                service.error_bits.set(rule_kind);
                service.error_hint_bits.set(rule_kind);
            }
            Transition::Succeeded | Transition::ChangedNot => {
                service.error_bits.clear(rule_kind);
                service.error_hint_bits.clear(rule_kind);
            }
            Transition::Init => {}
        }
    }

    fn attempt_deliveries(&self, service: &vigil_core::ServiceName, event: &mut Event, message: &str) {
        if event.delivery.alert_pending {
            match self.alert.send(service, event, message) {
                DeliveryOutcome::Delivered => event.delivery.mark_delivered(DeliveryHandler::Alert),
                DeliveryOutcome::Failed => {}
            }
        }
        if event.delivery.mmonit_pending {
            if let Some(mmonit) = &self.mmonit {
                match mmonit.send(service, event, message) {
                    DeliveryOutcome::Delivered => event.delivery.mark_delivered(DeliveryHandler::MMonit),
                    DeliveryOutcome::Failed => {}
                }
            }
        }
    }

    /// Walks the queue directory once, re-attempting outstanding deliveries
    /// for each file (spec §4.6 "Queue replay"). Aborts early once a
    /// handler has already failed this cycle, matching the spec's
    /// early-abort rule so one broken transport doesn't retry per-file.
    pub fn replay_queue(&self) -> Result<(), EngineError> {
        let Some(queue) = &self.queue else { return Ok(()) };
        let mut alert_failed_this_cycle = false;
        let mut mmonit_failed_this_cycle = false;

        for path in queue.list()? {
            let queued = match queue.read(&path) {
                Ok(q) => q,
                Err(err) => {
                    tracing::error!(path = %path.display(), %err, "discarding unreadable queue file");
                    queue.remove(&path)?;
                    continue;
                }
            };

            let mut event = vigil_core::Event::new(
                vigil_core::EventKey { service: vigil_core::ServiceName::new(queued.service_name.clone()), rule_kind: queued.rule_kind, binding_ordinal: queued.binding_ordinal },
                queued.transition,
                queued.collected_at_epoch,
                queued.message.clone(),
                vigil_core::ActionBinding::default(),
            );
            event.delivery = queued.delivery;
            event.repeat_counter = queued.repeat_counter;

            let service_name = vigil_core::ServiceName::new(queued.service_name.clone());

            if event.delivery.alert_pending && !alert_failed_this_cycle {
                match self.alert.send(&service_name, &event, &queued.message) {
                    DeliveryOutcome::Delivered => event.delivery.mark_delivered(DeliveryHandler::Alert),
                    DeliveryOutcome::Failed => alert_failed_this_cycle = true,
                }
            }
            if event.delivery.mmonit_pending && !mmonit_failed_this_cycle {
                if let Some(mmonit) = &self.mmonit {
                    match mmonit.send(&service_name, &event, &queued.message) {
                        DeliveryOutcome::Delivered => event.delivery.mark_delivered(DeliveryHandler::MMonit),
                        DeliveryOutcome::Failed => mmonit_failed_this_cycle = true,
                    }
                }
            }

            if !event.delivery.any_pending() {
                queue.remove(&path)?;
            } else {
                queue.rewrite(&path, &queued.service_name, &event, &queued.message, queued.action_kind)?;
            }

            if alert_failed_this_cycle && (self.mmonit.is_none() || mmonit_failed_this_cycle) {
                break;
            }
        }
        Ok(())
    }
}

/// Convenience used by call sites that only need the error-bit summary
/// without running the full pipeline (e.g. status reporting).
pub fn any_error(bits: &RuleKindBits) -> bool {
    bits.any()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::fake::FakeDeliveryChannel;
    use tempfile::tempdir;
    use vigil_core::{ActionBinding, EventKey, RuleKind, ServiceKind, ServiceName};

    fn svc() -> Service {
        Service::new(ServiceName::new("web"), ServiceKind::Process)
    }

    fn event() -> Event {
        let key = EventKey { service: ServiceName::new("web"), rule_kind: RuleKind::Port, binding_ordinal: 0 };
        Event::new(key, Transition::Failed, 0, String::new(), ActionBinding::default())
    }

    #[test]
    fn delivered_event_sets_error_bits_and_clears_pending() {
        let alert = FakeDeliveryChannel::new();
        let engine: EventEngine<FakeDeliveryChannel, FakeDeliveryChannel> = EventEngine::new(alert.clone(), None, None);
        let mut service = svc();
        let mut ev = event();

        let posted = engine.deliver(&mut service, &mut ev, "port down", 100).unwrap();
        assert_eq!(posted.transition, Transition::Failed);
        assert!(service.error_bits.is_set(RuleKind::Port));
        assert!(!ev.delivery.any_pending());
        assert_eq!(alert.calls().len(), 1);
    }

    #[test]
    fn failed_delivery_persists_to_queue() {
        let dir = tempdir().unwrap();
        let alert = FakeDeliveryChannel::new();
        alert.set_failing(true);
        let queue = EventQueue::new(dir.path().join("events"), 10);
        let engine: EventEngine<FakeDeliveryChannel, FakeDeliveryChannel> = EventEngine::new(alert, None, Some(queue));
        let mut service = svc();
        let mut ev = event();

        engine.deliver(&mut service, &mut ev, "port down", 100).unwrap();
        assert!(ev.delivery.any_pending());
        assert_eq!(engine.queue.as_ref().unwrap().list().unwrap().len(), 1);
    }

    #[test]
    fn queue_replay_delivers_and_removes_on_recovery() {
        let dir = tempdir().unwrap();
        let alert = FakeDeliveryChannel::new();
        alert.set_failing(true);
        let queue = EventQueue::new(dir.path().join("events"), 10);
        let engine: EventEngine<FakeDeliveryChannel, FakeDeliveryChannel> = EventEngine::new(alert.clone(), None, Some(queue));
        let mut service = svc();
        let mut ev = event();
        engine.deliver(&mut service, &mut ev, "port down", 100).unwrap();
        assert_eq!(engine.queue.as_ref().unwrap().list().unwrap().len(), 1);

        alert.set_failing(false);
        engine.replay_queue().unwrap();
        assert_eq!(engine.queue.as_ref().unwrap().list().unwrap().len(), 0);
    }

    #[test]
    fn init_transition_never_alerts() {
        let alert = FakeDeliveryChannel::new();
        let engine: EventEngine<FakeDeliveryChannel, FakeDeliveryChannel> = EventEngine::new(alert.clone(), None, None);
        let mut service = svc();
        let mut ev = event();
        ev.transition = Transition::Init;
        engine.deliver(&mut service, &mut ev, "first run", 100).unwrap();
        assert_eq!(alert.calls().len(), 0);
    }
}
