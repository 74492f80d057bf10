//! Out-of-band delivery handlers (spec §4.6 step 4: "an alert mailer and an
//! optional remote telemetry channel"). Sending mail and talking to a
//! remote monitoring collector are both external collaborators (spec §1
//! "Explicitly out of scope"); this module only defines the seam and a
//! logging-only production implementation, mirroring the teacher's
//! `NotifyAdapter` trait plus fake (`adapters::notify`).

use vigil_core::{Event, ServiceName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}

/// One out-of-band channel an Event can be routed to.
pub trait DeliveryChannel: Send + Sync {
    fn send(&self, service: &ServiceName, event: &Event, message: &str) -> DeliveryOutcome;

    fn name(&self) -> &'static str;
}

/// Logs the alert instead of sending mail. There is no SMTP stack in this
/// workspace (spec §1 lists mail transport as an external collaborator), so
/// this is the real production handler rather than a stand-in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertChannel;

impl DeliveryChannel for LogAlertChannel {
    fn send(&self, service: &ServiceName, event: &Event, message: &str) -> DeliveryOutcome {
        match event.log_level() {
            vigil_core::event::EventLogLevel::Error => tracing::error!(%service, transition = %event.transition, %message, "alert"),
            vigil_core::event::EventLogLevel::Warning => tracing::warn!(%service, transition = %event.transition, %message, "alert"),
            vigil_core::event::EventLogLevel::Info => tracing::info!(%service, transition = %event.transition, %message, "alert"),
            vigil_core::event::EventLogLevel::Silent => tracing::debug!(%service, transition = %event.transition, %message, "alert"),
        }
        DeliveryOutcome::Delivered
    }

    fn name(&self) -> &'static str {
        "alert"
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct DeliveryCall {
        pub service: ServiceName,
        pub message: String,
    }

    #[derive(Clone, Default)]
    pub struct FakeDeliveryChannel {
        calls: Arc<Mutex<Vec<DeliveryCall>>>,
        failing: Arc<Mutex<bool>>,
    }

    impl FakeDeliveryChannel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock() = failing;
        }

        pub fn calls(&self) -> Vec<DeliveryCall> {
            self.calls.lock().clone()
        }
    }

    impl DeliveryChannel for FakeDeliveryChannel {
        fn send(&self, service: &ServiceName, _event: &Event, message: &str) -> DeliveryOutcome {
            self.calls.lock().push(DeliveryCall { service: service.clone(), message: message.to_string() });
            if *self.failing.lock() {
                DeliveryOutcome::Failed
            } else {
                DeliveryOutcome::Delivered
            }
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }
}
