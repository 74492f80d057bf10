//! `Run`: the process-wide flag set signal handlers and the HTTP surface
//! both write into, and the main loop reads from at each cycle boundary
//! (spec §4.8, §5 "Global mutable state").
//!
//! Signal handlers must touch only atomic fields and do no other work
//! (spec §5 "Cancellation"). Rather than a raw `sigaction` trampoline into
//! a global, each signal is watched by a dedicated `tokio::signal::unix`
//! task that does nothing but flip one atomic — the teacher's codebase
//! already standardizes on `tokio::signal` for process control (see
//! `cli/src/output.rs`'s `tokio::signal::ctrl_c()`), so this follows the
//! same idiom for the daemon's full signal set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal as NixSignal};
use tokio::signal::unix::{signal, SignalKind};

use crate::error::ControlError;

/// Process-wide control flags (spec §4.8 `Run`). `ActionPending` is tracked
/// per-Service on the Service itself (`pending_action`); this struct only
/// holds the flags that are genuinely global.
#[derive(Debug, Default)]
pub struct Run {
    stopped: AtomicBool,
    do_reload: AtomicBool,
    do_wakeup: AtomicBool,
}

impl Run {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn request_reload(&self) {
        self.do_reload.store(true, Ordering::SeqCst);
    }

    /// Consumes the reload flag: true at most once per request.
    pub fn take_reload(&self) -> bool {
        self.do_reload.swap(false, Ordering::SeqCst)
    }

    pub fn request_wakeup(&self) {
        self.do_wakeup.store(true, Ordering::SeqCst);
    }

    pub fn take_wakeup(&self) -> bool {
        self.do_wakeup.swap(false, Ordering::SeqCst)
    }
}

/// Installs the daemon's signal policy (spec §6 "Signals"):
/// `SIGTERM`/`SIGINT` request a graceful stop, `SIGHUP` requests a reload,
/// `SIGUSR1` requests a wakeup, `SIGPIPE` is ignored outright so a probe
/// writing to a closed socket never kills the daemon. Spawns one
/// lightweight watcher task per signal; each iteration only flips an
/// atomic, matching spec §5's "signal handler context" discipline.
pub fn install_signal_handlers(run: Arc<Run>) -> Result<(), ControlError> {
    ignore_sigpipe()?;

    spawn_watcher(SignalKind::terminate(), {
        let run = run.clone();
        move || run.request_stop()
    })?;
    spawn_watcher(SignalKind::interrupt(), {
        let run = run.clone();
        move || run.request_stop()
    })?;
    spawn_watcher(SignalKind::hangup(), {
        let run = run.clone();
        move || run.request_reload()
    })?;
    spawn_watcher(SignalKind::user_defined1(), move || run.request_wakeup())?;

    Ok(())
}

fn spawn_watcher(kind: SignalKind, mut on_signal: impl FnMut() + Send + 'static) -> Result<(), ControlError> {
    let mut stream = signal(kind).map_err(ControlError::Signal)?;
    tokio::spawn(async move {
        while stream.recv().await.is_some() {
            on_signal();
        }
    });
    Ok(())
}

fn ignore_sigpipe() -> Result<(), ControlError> {
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe { sigaction(NixSignal::SIGPIPE, &action) }.map_err(|e| ControlError::Signal(std::io::Error::from_raw_os_error(e as i32)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_flag_is_consumed_exactly_once() {
        let run = Run::new();
        run.request_reload();
        assert!(run.take_reload());
        assert!(!run.take_reload());
    }

    #[test]
    fn wakeup_flag_is_consumed_exactly_once() {
        let run = Run::new();
        run.request_wakeup();
        assert!(run.take_wakeup());
        assert!(!run.take_wakeup());
    }

    #[test]
    fn stop_flag_is_sticky() {
        let run = Run::new();
        assert!(!run.is_stopped());
        run.request_stop();
        assert!(run.is_stopped());
        assert!(run.is_stopped());
    }
}
