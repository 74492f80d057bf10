//! The daemon main loop (spec §4.8, §5): wires the Rule Graph, Task
//! Scheduler, Worker Dispatcher, Event/Action Engines, the Control Surface,
//! and the on-disk state files together.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use vigil_core::{ActionKind, ServiceName};
use vigil_engine::{ActionEngine, LogAlertChannel};
use vigil_probes::LinuxProcessCollector;
use vigil_rules::Graph;
use vigil_sched::Scheduler;
use vigil_store::{EventQueue, PidFile, Snapshot};

use crate::cycle::{run_service_cycle, CycleState, Engine};

pub struct Paths {
    pub control_file: PathBuf,
    pub pid_file: PathBuf,
    pub state_file: PathBuf,
    pub identity_file: PathBuf,
    pub event_queue_dir: PathBuf,
}

pub struct DaemonOptions {
    pub paths: Paths,
    pub poll_interval: Duration,
    pub foreground: bool,
    pub http_addr: std::net::SocketAddr,
    pub auth: vigil_control::AuthConfig,
}

fn now_epoch() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Runs the daemon until `Run::request_stop` fires. Returns the process
/// exit code (spec §6 "Exit codes").
pub fn run(options: DaemonOptions) -> anyhow::Result<i32> {
    let _identity = vigil_store::identity_file::load_or_create(&options.paths.identity_file)?;
    let _pid_file = PidFile::acquire(&options.paths.pid_file)?;

    let mut graph = vigil_config::load_file(&options.paths.control_file)?;
    restore_snapshot(&mut graph, &options.paths.state_file);

    let graph = Arc::new(Mutex::new(graph));
    let queue = EventQueue::new(&options.paths.event_queue_dir, 4096);
    let engine: Arc<Engine> = Arc::new(Engine::new(LogAlertChannel, None, Some(queue)));
    let action_engine = Arc::new(ActionEngine::new(LinuxProcessCollector));
    let cycle_state = Arc::new(Mutex::new(CycleState::default()));
    let dirty = Arc::new(AtomicBool::new(false));

    let run = vigil_control::Run::new();

    let scheduler = Scheduler::new(4);
    let names: Vec<ServiceName> = graph.lock().names().cloned().collect();
    let mut tasks = Vec::new();
    for name in names {
        let task = scheduler.allocate(name.as_str());
        let graph = graph.clone();
        let engine = engine.clone();
        let action_engine = action_engine.clone();
        let cycle_state = cycle_state.clone();
        let dirty = dirty.clone();
        task.set_worker(move |_task| {
            run_one_cycle(&name, &graph, &engine, &action_engine, &cycle_state, &dirty);
        });
        task.periodic(Duration::from_millis(0), options.poll_interval);
        task.start();
        tasks.push(task);
    }

    let control_state = vigil_control::ControlState { graph: graph.clone(), run: run.clone(), auth: Arc::new(options.auth) };

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let exit_code = runtime.block_on(async {
        vigil_control::install_signal_handlers(run.clone())?;

        let router = vigil_control::router(control_state);
        let listener = tokio::net::TcpListener::bind(options.http_addr).await?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>()).await;
        });

        while !run.is_stopped() {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if run.take_reload() {
                if let Ok(fresh) = vigil_config::load_file(&options.paths.control_file) {
                    *graph.lock() = fresh;
                    tracing::info!("control file reloaded");
                } else {
                    tracing::error!("reload failed, keeping prior graph");
                }
            }
        }

        server.abort();
        anyhow::Ok(0)
    })?;

    persist_snapshot(&graph.lock(), &options.paths.state_file)?;
    let _ = options.foreground;
    Ok(exit_code)
}

/// A single service's scheduled cycle: runs directly on the Scheduler's own
/// worker pool when the service's deadline fires (spec §4.5 "Scheduler" owns
/// dispatch; there is no second worker pool layered on top of it).
fn run_one_cycle(
    name: &ServiceName,
    graph: &Arc<Mutex<Graph>>,
    engine: &Arc<Engine>,
    action_engine: &Arc<ActionEngine<LinuxProcessCollector>>,
    cycle_state: &Arc<Mutex<CycleState>>,
    dirty: &Arc<AtomicBool>,
) {
    let now = now_epoch();
    let mut graph = graph.lock();
    let Some(service) = graph.get_mut(name) else { return };
    if !service.is_scheduled() {
        return;
    }

    let fired = {
        let mut cycle_state = cycle_state.lock();
        match run_service_cycle(service, &mut cycle_state, engine, now) {
            Ok(fired) => fired,
            Err(err) => {
                tracing::error!(service = %name, %err, "cycle evaluation failed");
                return;
            }
        }
    };

    for (key, action) in fired {
        if matches!(action, ActionKind::Ignore | ActionKind::Alert) {
            continue;
        }
        let Some(svc) = graph.get(name) else { continue };
        let Some(rule_action) = svc.events.get(&key).map(|e| e.selected_action().clone()) else { continue };
        if let Err(err) = action_engine.run_rule_action(&mut graph, name, &rule_action, now) {
            tracing::error!(service = %name, %err, "rule action failed");
        }
    }

    if let Some(pending) = graph.get(name).and_then(|s| s.pending_action) {
        match action_engine.control(&mut graph, name, pending, Duration::from_secs(30), now) {
            Ok(vigil_engine::ActionOutcome::Succeeded | vigil_engine::ActionOutcome::Failed) => {
                if let Some(svc) = graph.get_mut(name) {
                    svc.pending_action = None;
                }
            }
            Ok(vigil_engine::ActionOutcome::Deferred) => {}
            Err(err) => tracing::error!(service = %name, %err, "pending action failed"),
        }
    }

    let _ = engine.replay_queue();
    dirty.store(true, Ordering::Relaxed);
}

fn restore_snapshot(graph: &mut Graph, path: &std::path::Path) {
    let Ok(Some(snapshot)) = Snapshot::load(path) else { return };
    let reboot = snapshot.reboot_detected(vigil_store::current_boot_epoch(now_epoch()));
    for name in graph.names().cloned().collect::<Vec<_>>() {
        let Some(persisted) = snapshot.services.get(name.as_str()) else { continue };
        if let Some(service) = graph.get_mut(&name) {
            service.state = persisted.state;
            service.pid = if reboot { None } else { persisted.pid };
            service.collected_at_epoch = persisted.collected_at_epoch;
            service.error_bits = vigil_core::RuleKindBits::from_raw(persisted.error_bits);
            service.error_hint_bits = vigil_core::RuleKindBits::from_raw(persisted.error_hint_bits);
        }
    }
}

fn persist_snapshot(graph: &Graph, path: &std::path::Path) -> anyhow::Result<()> {
    let mut snapshot = Snapshot::new(vigil_store::current_boot_epoch(now_epoch()));
    for service in graph.iter() {
        snapshot.services.insert(
            service.name.to_string(),
            vigil_store::PersistedService {
                state: service.state,
                pid: service.pid,
                collected_at_epoch: service.collected_at_epoch,
                error_bits: service.error_bits.raw(),
                error_hint_bits: service.error_hint_bits.raw(),
            },
        );
    }
    snapshot.save(path)?;
    Ok(())
}
