//! Action Engine: `control(service, action)` (spec §4.7).
//!
//! Dispatches by action kind, honoring the dependency traversal from
//! `vigil-rules`. Spawns through `vigil-exec`'s raw fork/exec rather than
//! `std::process::Command`, and polls process liveness through
//! `vigil-probes::ProcessCollector` with the exponential backoff spec §4.7
//! specifies for Start/Stop.

use std::thread::sleep;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use vigil_core::{Action, ActionKind, MonitorState, Service, ServiceKind, ServiceName};
use vigil_exec::CommandTemplate;
use vigil_probes::ProcessCollector;
use vigil_rules::Graph;

use crate::error::EngineError;

const BACKOFF_INITIAL: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(1);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Result of dispatching one action (spec §8 invariant: "after the dispatch
/// returns, `s.pending_action == None` iff A completed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeeded,
    Failed,
    /// A parent in the dependency chain has not yet reached a startable
    /// state; `pending_action` was set to `Start` for the next cycle (spec
    /// §4.4 "Start(s)").
    Deferred,
}

pub struct ActionEngine<P> {
    collector: P,
}

impl<P: ProcessCollector> ActionEngine<P> {
    pub fn new(collector: P) -> Self {
        Self { collector }
    }

    /// Dispatches an administrative action across the dependency traversal
    /// named in spec §4.4: `Start`/`Monitor` post-order parents,
    /// `Stop`/`Unmonitor` in-order dependants, `Restart` is both.
    pub fn control(&self, graph: &mut Graph, target: &ServiceName, action: ActionKind, timeout: Duration, now_epoch: u64) -> Result<ActionOutcome, EngineError> {
        match action {
            ActionKind::Start => self.run_start(graph, target, timeout, now_epoch),
            ActionKind::Stop => self.run_stop(graph, target, timeout, now_epoch, true),
            ActionKind::Restart => self.run_restart(graph, target, timeout, now_epoch),
            ActionKind::Monitor => self.run_monitor(graph, target),
            ActionKind::Unmonitor => self.run_unmonitor(graph, target),
            ActionKind::Ignore => Ok(ActionOutcome::Succeeded),
            ActionKind::Alert => Ok(ActionOutcome::Succeeded),
            ActionKind::Exec => Err(EngineError::MissingCommand(target.clone(), "control() does not spawn bare Exec; use run_rule_action")),
        }
    }

    /// Invoked by the Event Engine with the Action selected for a rule
    /// transition (spec §4.6 step 3). Unlike `control`, this carries the
    /// rule's own command/timeout/uid/gid rather than the Service's.
    pub fn run_rule_action(&self, graph: &mut Graph, target: &ServiceName, action: &Action, now_epoch: u64) -> Result<ActionOutcome, EngineError> {
        match action.kind {
            ActionKind::Ignore | ActionKind::Alert => Ok(ActionOutcome::Succeeded),
            ActionKind::Exec => self.run_exec(graph, target, action, now_epoch),
            ActionKind::Start => self.run_start(graph, target, action.timeout, now_epoch),
            ActionKind::Stop => self.run_stop(graph, target, action.timeout, now_epoch, true),
            ActionKind::Restart => self.run_restart(graph, target, action.timeout, now_epoch),
            ActionKind::Monitor => self.run_monitor(graph, target),
            ActionKind::Unmonitor => self.run_unmonitor(graph, target),
        }
    }

    fn run_start(&self, graph: &mut Graph, target: &ServiceName, timeout: Duration, now_epoch: u64) -> Result<ActionOutcome, EngineError> {
        let order = graph.start_order(target)?;
        for name in &order {
            let is_target = name == target;
            let succeeded = self.start_one(graph, name, timeout, now_epoch)?;
            if !succeeded && !is_target {
                if let Some(svc) = graph.get_mut(target) {
                    svc.pending_action = Some(ActionKind::Start);
                }
                return Ok(ActionOutcome::Deferred);
            }
            if !succeeded {
                return Ok(ActionOutcome::Failed);
            }
        }
        Ok(ActionOutcome::Succeeded)
    }

    fn start_one(&self, graph: &mut Graph, name: &ServiceName, timeout: Duration, now_epoch: u64) -> Result<bool, EngineError> {
        let service = graph.get_mut(name).ok_or_else(|| EngineError::UnknownService(name.clone()))?;

        if service.kind == ServiceKind::Process {
            if let Some(pid) = service.pid {
                if self.collector.pid_exists(pid) {
                    service.state = MonitorState::Yes;
                    return Ok(true);
                }
            }
        }

        let argv = service.start_command.clone().ok_or_else(|| EngineError::MissingCommand(name.clone(), "start"))?;
        let cmd = build_command(&argv, service, "Start", now_epoch)?;
        let handle = vigil_exec::execute(&cmd)?;
        let pid = handle.pid();

        let alive = self.poll_with_backoff(timeout, || handle.is_running() && self.collector.pid_exists(pid));
        handle.detach();

        let service = graph.get_mut(name).ok_or_else(|| EngineError::UnknownService(name.clone()))?;
        if alive {
            service.pid = Some(pid);
            service.state = MonitorState::Yes;
            service.pending_action = None;
        } else {
            service.pending_action = Some(ActionKind::Start);
        }
        Ok(alive)
    }

    fn run_stop(&self, graph: &mut Graph, target: &ServiceName, timeout: Duration, now_epoch: u64, unmonitor: bool) -> Result<ActionOutcome, EngineError> {
        let order = graph.stop_order(target)?;
        let mut ok = true;
        for name in &order {
            if !self.stop_one(graph, name, timeout, now_epoch, unmonitor)? {
                ok = false;
            }
        }
        Ok(if ok { ActionOutcome::Succeeded } else { ActionOutcome::Failed })
    }

    fn stop_one(&self, graph: &mut Graph, name: &ServiceName, timeout: Duration, now_epoch: u64, unmonitor: bool) -> Result<bool, EngineError> {
        let service = graph.get_mut(name).ok_or_else(|| EngineError::UnknownService(name.clone()))?;
        if !service.is_monitored() {
            return Ok(true);
        }

        let stopped = if let Some(argv) = service.stop_command.clone() {
            let cmd = build_command(&argv, service, "Stop", now_epoch)?;
            let handle = vigil_exec::execute(&cmd)?;
            let done = self.poll_with_backoff(timeout, || !handle.is_running());
            handle.detach();
            done
        } else if let Some(pid) = service.pid {
            let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            let gone = self.poll_fixed_interval(timeout, || !self.collector.pid_exists(pid));
            if !gone {
                let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
                sleep(KILL_GRACE);
            }
            true
        } else {
            true
        };

        let service = graph.get_mut(name).ok_or_else(|| EngineError::UnknownService(name.clone()))?;
        if stopped {
            service.pid = None;
            service.collected_at_epoch = now_epoch;
            service.state = if unmonitor { MonitorState::NotMonitored } else { MonitorState::Init };
        }
        Ok(stopped)
    }

    fn run_restart(&self, graph: &mut Graph, target: &ServiceName, timeout: Duration, now_epoch: u64) -> Result<ActionOutcome, EngineError> {
        let plan = graph.restart_plan(target)?;
        for name in &plan.stop_dependants {
            self.stop_one(graph, name, timeout, now_epoch, false)?;
        }

        let has_explicit = graph.get(target).is_some_and(|s| s.restart_command.is_some());
        let target_ok = if has_explicit {
            self.restart_explicit(graph, target, timeout, now_epoch)?
        } else {
            let stop_ok = self.stop_one(graph, target, timeout, now_epoch, false)?;
            if !stop_ok {
                if let Some(svc) = graph.get_mut(target) {
                    svc.state = MonitorState::Yes;
                }
                false
            } else {
                self.start_one(graph, target, timeout, now_epoch)?
            }
        };

        for name in &plan.start_dependants {
            self.start_one(graph, name, timeout, now_epoch)?;
        }

        Ok(if target_ok { ActionOutcome::Succeeded } else { ActionOutcome::Failed })
    }

    fn restart_explicit(&self, graph: &mut Graph, target: &ServiceName, timeout: Duration, now_epoch: u64) -> Result<bool, EngineError> {
        let service = graph.get_mut(target).ok_or_else(|| EngineError::UnknownService(target.clone()))?;
        let argv = service.restart_command.clone().ok_or_else(|| EngineError::MissingCommand(target.clone(), "restart"))?;
        let cmd = build_command(&argv, service, "Restart", now_epoch)?;
        let handle = vigil_exec::execute(&cmd)?;
        let pid = handle.pid();
        let alive = self.poll_with_backoff(timeout, || handle.is_running() && self.collector.pid_exists(pid));
        handle.detach();

        let service = graph.get_mut(target).ok_or_else(|| EngineError::UnknownService(target.clone()))?;
        if alive {
            service.pid = Some(pid);
            service.state = MonitorState::Yes;
        }
        Ok(alive)
    }

    fn run_monitor(&self, graph: &mut Graph, target: &ServiceName) -> Result<ActionOutcome, EngineError> {
        for name in graph.monitor_order(target)? {
            let svc = graph.get_mut(&name).ok_or_else(|| EngineError::UnknownService(name.clone()))?;
            svc.state = MonitorState::Init;
        }
        Ok(ActionOutcome::Succeeded)
    }

    fn run_unmonitor(&self, graph: &mut Graph, target: &ServiceName) -> Result<ActionOutcome, EngineError> {
        for name in graph.unmonitor_order(target)? {
            let svc = graph.get_mut(&name).ok_or_else(|| EngineError::UnknownService(name.clone()))?;
            svc.state = MonitorState::NotMonitored;
            svc.pid = None;
            svc.collected_at_epoch = 0;
        }
        Ok(ActionOutcome::Succeeded)
    }

    fn run_exec(&self, graph: &mut Graph, target: &ServiceName, action: &Action, now_epoch: u64) -> Result<ActionOutcome, EngineError> {
        let service = graph.get_mut(target).ok_or_else(|| EngineError::UnknownService(target.clone()))?;
        let argv = action.command.clone().ok_or_else(|| EngineError::MissingCommand(target.clone(), "exec"))?;
        let mut cmd = build_command(&argv, service, "Action", now_epoch)?;
        if let Some(uid) = action.uid {
            cmd = cmd.with_uid(uid)?;
        }
        if let Some(gid) = action.gid {
            cmd = cmd.with_gid(gid)?;
        }
        let handle = vigil_exec::execute(&cmd)?;
        handle.detach();
        Ok(ActionOutcome::Succeeded)
    }

    /// Polls `alive` with the exponential backoff spec §4.7 specifies for
    /// Start: initial 100ms, doubling, capped at 1s, until `timeout`
    /// elapses.
    fn poll_with_backoff(&self, timeout: Duration, mut alive: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut backoff = BACKOFF_INITIAL;
        loop {
            if alive() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            sleep(backoff.min(deadline.saturating_duration_since(std::time::Instant::now())));
            backoff = (backoff * 2).min(BACKOFF_CAP);
        }
    }

    /// Polls at the fixed 100ms interval spec §4.7 specifies for Stop.
    fn poll_fixed_interval(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            sleep(STOP_POLL_INTERVAL.min(deadline.saturating_duration_since(std::time::Instant::now())));
        }
    }
}

/// Builds a `CommandTemplate` for `argv`, injecting the `MONIT_*`
/// environment variables spec §4.7 names.
fn build_command(argv: &[String], service: &Service, event_kind: &str, now_epoch: u64) -> Result<CommandTemplate, EngineError> {
    let (path, rest) = argv.split_first().ok_or_else(|| EngineError::MissingCommand(service.name.clone(), "argv"))?;
    let mut cmd = CommandTemplate::build_command(path.clone(), rest.to_vec())?;
    if let Some(uid) = service.uid {
        cmd = cmd.with_uid(uid)?;
    }
    if let Some(gid) = service.gid {
        cmd = cmd.with_gid(gid)?;
    }
    cmd = cmd
        .with_env("MONIT_DATE", format_date(now_epoch))
        .with_env("MONIT_SERVICE", service.name.as_str())
        .with_env("MONIT_HOST", hostname())
        .with_env("MONIT_EVENT", event_kind)
        .with_env("MONIT_DESCRIPTION", format!("{event_kind} action on {}", service.name));
    if let Some(pid) = service.pid {
        cmd = cmd.with_env("MONIT_PROCESS_PID", pid.to_string());
    }
    Ok(cmd)
}

fn format_date(epoch: u64) -> String {
    use chrono::{DateTime, Utc};
    let dt = DateTime::<Utc>::from_timestamp(epoch as i64, 0).unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default());
    dt.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

fn hostname() -> String {
    let mut buf = [0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if ret != 0 {
        return "localhost".to_string();
    }
    let nul = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..nul]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{MonitorState, ServiceKind};
    use vigil_probes::ProbeError;

    struct FakeCollector {
        alive: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl ProcessCollector for FakeCollector {
        fn sample(&self, _pid: i32) -> Result<vigil_probes::ProcessSnapshot, ProbeError> {
            Err(ProbeError::NoSuchProcess(0))
        }
        fn pid_exists(&self, _pid: i32) -> bool {
            self.alive.load(std::sync::atomic::Ordering::SeqCst)
        }
        fn find_by_pattern(&self, _pattern: &str) -> Result<Vec<i32>, ProbeError> {
            Ok(Vec::new())
        }
    }

    fn graph_with(name: &str, start_cmd: Vec<String>) -> Graph {
        let mut g = Graph::new();
        let mut svc = Service::new(ServiceName::new(name), ServiceKind::Process);
        svc.start_command = Some(start_cmd);
        svc.state = MonitorState::Init;
        g.insert(svc);
        g
    }

    #[test]
    fn start_succeeds_when_process_stays_alive() {
        let mut graph = graph_with("web", vec!["/bin/sleep".into(), "2".into()]);
        let engine = ActionEngine::new(FakeCollector { alive: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)) });
        let outcome = engine.control(&mut graph, &ServiceName::new("web"), ActionKind::Start, Duration::from_millis(500), 0).unwrap();
        assert_eq!(outcome, ActionOutcome::Succeeded);
        let svc = graph.get(&ServiceName::new("web")).unwrap();
        assert_eq!(svc.state, MonitorState::Yes);
        assert!(svc.pid.is_some());
    }

    #[test]
    fn start_times_out_when_pid_never_appears() {
        let mut graph = graph_with("web", vec!["/bin/true".into()]);
        let engine = ActionEngine::new(FakeCollector { alive: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)) });
        let outcome = engine.control(&mut graph, &ServiceName::new("web"), ActionKind::Start, Duration::from_millis(250), 0).unwrap();
        assert_eq!(outcome, ActionOutcome::Failed);
        let svc = graph.get(&ServiceName::new("web")).unwrap();
        assert_eq!(svc.pending_action, Some(ActionKind::Start));
    }

    #[test]
    fn monitor_and_unmonitor_only_mutate_state() {
        let mut graph = graph_with("web", vec!["/bin/true".into()]);
        let engine = ActionEngine::new(FakeCollector { alive: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)) });
        engine.control(&mut graph, &ServiceName::new("web"), ActionKind::Unmonitor, Duration::from_secs(1), 0).unwrap();
        assert_eq!(graph.get(&ServiceName::new("web")).unwrap().state, MonitorState::NotMonitored);
        engine.control(&mut graph, &ServiceName::new("web"), ActionKind::Monitor, Duration::from_secs(1), 0).unwrap();
        assert_eq!(graph.get(&ServiceName::new("web")).unwrap().state, MonitorState::Init);
    }

    #[test]
    fn restart_with_dependants_stops_and_starts_in_order() {
        // spec §8 scenario 4: A depends on B, B depends on C. restart(B)
        // stops A, stops B, starts B, starts A; C is untouched. Dependants
        // edges run the other way (C.dependants=[B], B.dependants=[A]),
        // since a service's `dependants` are the services that depend on it.
        let mut graph = Graph::new();
        for (name, deps) in [("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])] {
            let mut svc = Service::new(ServiceName::new(name), ServiceKind::Process);
            svc.start_command = Some(vec!["/bin/sleep".into(), "2".into()]);
            svc.dependants = deps.into_iter().map(ServiceName::new).collect();
            svc.state = MonitorState::Yes;
            svc.pid = Some(1);
            graph.insert(svc);
        }
        let engine = ActionEngine::new(FakeCollector { alive: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)) });
        let outcome = engine.control(&mut graph, &ServiceName::new("b"), ActionKind::Restart, Duration::from_millis(500), 0).unwrap();
        assert_eq!(outcome, ActionOutcome::Succeeded);
        // C was never touched — its original pid survives.
        assert_eq!(graph.get(&ServiceName::new("c")).unwrap().pid, Some(1));
        // A and B were stopped and restarted, so they now carry fresh pids.
        assert_ne!(graph.get(&ServiceName::new("a")).unwrap().pid, Some(1));
        assert_ne!(graph.get(&ServiceName::new("b")).unwrap().pid, Some(1));
    }
}
