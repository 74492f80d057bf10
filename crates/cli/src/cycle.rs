//! One evaluation cycle over a Service's rules (spec §4.5/§4.6 tying
//! together probes, the debouncer, and the event engine). Grounded on
//! `vigil-probes`'s stated scope: a fully wired `port`/`cpu`/`memory`/
//! `pid`/`exist`/`space` path, stub outcomes (skipped, not alerted) for
//! every rule kind spec §1 leaves as an external protocol collaborator.

use std::collections::HashMap;
use std::time::Duration;

use vigil_core::{Event, EventKey, Rule, RuleKind, Service, ServiceKind};
use vigil_engine::{post, EngineError, EventEngine, LogAlertChannel, Outcome};
use vigil_probes::{clock_ticks_per_sec, cpu_percent_between, FilesystemCollector, LinuxFilesystemCollector, LinuxProcessCollector, Probe, ProcessCollector, ProcessSnapshot, TcpConnectProbe};

pub type Engine = EventEngine<LogAlertChannel, LogAlertChannel>;

/// Process snapshots from the previous cycle, needed to turn two cumulative
/// CPU-tick samples into a percentage (spec §1 `ProcessSnapshot` doc).
#[derive(Default)]
pub struct CycleState {
    previous_samples: HashMap<vigil_core::ServiceName, ProcessSnapshot>,
}

/// Samples every rule on `service`, debounces, and delivers any resulting
/// transition. Returns the names of rules whose action should now run.
pub fn run_service_cycle(
    service: &mut Service,
    state: &mut CycleState,
    engine: &Engine,
    now_epoch: u64,
) -> Result<Vec<(EventKey, vigil_core::ActionKind)>, EngineError> {
    let mut fired = Vec::new();
    let mut any_failed = false;
    let rules = service.rules.clone();

    for (ordinal, rule) in rules.iter().enumerate() {
        let Some(outcome) = sample_rule(service, rule, state) else { continue };
        any_failed |= outcome.failed;

        let key = EventKey { service: service.name.clone(), rule_kind: rule.kind, binding_ordinal: ordinal as u32 };
        let first_post = !service.events.contains_key(&key);
        let mut event = service
            .events
            .remove(&key)
            .unwrap_or_else(|| Event::new(key.clone(), vigil_core::Transition::Init, now_epoch, String::new(), rule.binding.clone()));
        event.binding = rule.binding.clone();

        let debounce = event.selected_action().debounce;
        let transitioned = post(&mut event, outcome, debounce, first_post).is_some();
        if !transitioned {
            service.events.insert(key, event);
            continue;
        }

        let message = describe(service, rule, outcome);
        engine.deliver(service, &mut event, &message, now_epoch)?;
        let action = event.selected_action().kind;
        service.events.insert(key.clone(), event);

        fired.push((key, action));
    }

    // A service that has never been explicitly started (network/filesystem/
    // host/system checks, or a process already running when discovered)
    // becomes actively monitored once a cycle completes with nothing
    // failing, mirroring Monit's own lifecycle: `Init`/`Waiting` only
    // persist while a check is outstanding or a start is pending.
    if !any_failed && matches!(service.state, vigil_core::MonitorState::Init | vigil_core::MonitorState::Waiting) {
        service.state = vigil_core::MonitorState::Yes;
    }

    Ok(fired)
}

fn describe(service: &Service, rule: &Rule, outcome: Outcome) -> String {
    let verb = if outcome.failed { "failed" } else { "ok" };
    format!("{} {} check {verb}", service.name, rule.kind)
}

fn sample_rule(service: &Service, rule: &Rule, state: &mut CycleState) -> Option<Outcome> {
    match rule.kind {
        RuleKind::Port => sample_port(service, rule),
        RuleKind::Exist => sample_exist(service),
        RuleKind::PidChanged => sample_pid_changed(service, state),
        RuleKind::Cpu => sample_cpu(service, rule, state),
        RuleKind::Memory => sample_memory(service, rule),
        RuleKind::FilesystemSpace => sample_filesystem_space(service, rule),
        RuleKind::FilesystemInodes => sample_filesystem_inodes(service, rule),
        // Every other rule kind names an external protocol or resource
        // collaborator spec §1 puts out of scope; skip rather than guess.
        _ => None,
    }
}

fn sample_port(service: &Service, rule: &Rule) -> Option<Outcome> {
    if service.kind != ServiceKind::Network && service.kind != ServiceKind::Host {
        return None;
    }
    let target = service.path.as_ref()?;
    let probe = TcpConnectProbe;
    match probe.check(target, Duration::from_secs(5)) {
        Ok(()) => Some(if rule.invert { Outcome::fail() } else { Outcome::ok() }),
        Err(_) => Some(if rule.invert { Outcome::ok() } else { Outcome::fail() }),
    }
}

fn sample_exist(service: &Service) -> Option<Outcome> {
    if service.kind != ServiceKind::Process {
        return None;
    }
    let collector = LinuxProcessCollector;
    match service.pid {
        Some(pid) if collector.pid_exists(pid) => Some(Outcome::ok()),
        _ => Some(Outcome::fail()),
    }
}

fn sample_pid_changed(service: &Service, state: &mut CycleState) -> Option<Outcome> {
    let pid = service.pid?;
    let collector = LinuxProcessCollector;
    let sample = collector.sample(pid).ok()?;
    let previous = state.previous_samples.get(&service.name).copied();
    let changed = previous.is_some_and(|prev| prev.pid != sample.pid);
    Some(if changed { Outcome::changed() } else { Outcome::ok() })
}

fn sample_cpu(service: &Service, rule: &Rule, state: &mut CycleState) -> Option<Outcome> {
    let pid = service.pid?;
    let collector = LinuxProcessCollector;
    let sample = collector.sample(pid).ok()?;
    let previous = state.previous_samples.insert(service.name.clone(), sample);
    let percent = previous.map(|prev| cpu_percent_between(&prev, &sample, Duration::from_secs(1), clock_ticks_per_sec())).unwrap_or(0.0);
    Some(if rule.numeric_matches(percent) { Outcome::fail() } else { Outcome::ok() })
}

fn sample_memory(service: &Service, rule: &Rule) -> Option<Outcome> {
    let pid = service.pid?;
    let collector = LinuxProcessCollector;
    let sample = collector.sample(pid).ok()?;
    Some(if rule.numeric_matches(sample.rss_bytes as f64) { Outcome::fail() } else { Outcome::ok() })
}

fn sample_filesystem_space(service: &Service, rule: &Rule) -> Option<Outcome> {
    let path = service.path.as_ref()?;
    let collector = LinuxFilesystemCollector;
    let snapshot = collector.sample(std::path::Path::new(path)).ok()?;
    Some(if rule.numeric_matches(snapshot.space_percent_used()) { Outcome::fail() } else { Outcome::ok() })
}

fn sample_filesystem_inodes(service: &Service, rule: &Rule) -> Option<Outcome> {
    let path = service.path.as_ref()?;
    let collector = LinuxFilesystemCollector;
    let snapshot = collector.sample(std::path::Path::new(path)).ok()?;
    Some(if rule.numeric_matches(snapshot.inodes_percent_used()) { Outcome::fail() } else { Outcome::ok() })
}
