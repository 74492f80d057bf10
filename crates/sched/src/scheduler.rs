//! Task Scheduler: a timer loop atop the Worker Dispatcher (spec §4.3).
//!
//! Grounded in libmonit's `Scheduler.c`. That implementation drives an
//! `libev` loop under a mutex released only while collecting events; this
//! port replaces the libev reactor with a plain condvar-guarded deadline
//! scan, since the fidelity that matters for the spec is the CAS
//! `in_progress` guard and the Limbo auto-cancel protocol, not the reactor
//! implementation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};

use crate::dispatcher::Dispatcher;
use crate::task::{TaskKind, TaskState};

fn epoch_secs_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn instant_for_unix_time(unix_time: u64) -> Instant {
    let now_epoch = epoch_secs_now();
    let delta = unix_time.saturating_sub(now_epoch);
    Instant::now() + Duration::from_secs(delta)
}

type WorkerFn = dyn Fn(&ScheduledTask) + Send + Sync;

struct TaskInner {
    name: Mutex<String>,
    kind: Mutex<Option<TaskKind>>,
    state: Mutex<TaskState>,
    in_progress: AtomicBool,
    available: AtomicBool,
    next_fire: Mutex<Option<Instant>>,
    last_executed: AtomicU64,
    worker: Mutex<Option<Arc<WorkerFn>>>,
    scheduler: Weak<SchedulerShared>,
}

struct SchedulerShared {
    tasks: Mutex<Vec<Arc<TaskInner>>>,
    cv: Condvar,
    stopped: AtomicBool,
    dispatcher: Dispatcher<Arc<TaskInner>>,
}

/// A reusable slot returned by `Scheduler::allocate`.
#[derive(Clone)]
pub struct ScheduledTask {
    inner: Arc<TaskInner>,
}

impl ScheduledTask {
    pub fn name(&self) -> String {
        self.inner.name.lock().clone()
    }

    pub fn one_shot(&self, offset: Duration) {
        let mut kind = self.inner.kind.lock();
        assert!(kind.is_none() || matches!(*kind, Some(TaskKind::OneShot { .. })), "ScheduledTask: kind already set to a different variant");
        *kind = Some(TaskKind::OneShot { offset });
    }

    pub fn periodic(&self, offset: Duration, interval: Duration) {
        let mut kind = self.inner.kind.lock();
        assert!(kind.is_none() || matches!(*kind, Some(TaskKind::Periodic { .. })), "ScheduledTask: kind already set to a different variant");
        *kind = Some(TaskKind::Periodic { offset, interval });
    }

    pub fn at(&self, unix_time: u64) {
        let mut kind = self.inner.kind.lock();
        assert!(kind.is_none() || matches!(*kind, Some(TaskKind::At { .. })), "ScheduledTask: kind already set to a different variant");
        *kind = Some(TaskKind::At { unix_time });
    }

    pub fn set_worker(&self, worker: impl Fn(&ScheduledTask) + Send + Sync + 'static) {
        *self.inner.worker.lock() = Some(Arc::new(worker));
    }

    /// Arms the timer for a freshly allocated task (spec §4.3 "Task
    /// Methods").
    pub fn start(&self) {
        let Some(shared) = self.inner.scheduler.upgrade() else { return };
        let _guard = shared.tasks.lock();
        if shared.stopped.load(Ordering::Acquire) {
            return;
        }
        let kind = match *self.inner.kind.lock() {
            Some(k) => k,
            None => unreachable!("ScheduledTask::start: no kind configured"),
        };
        assert!(self.inner.worker.lock().is_some(), "ScheduledTask::start: no worker configured");
        {
            let mut state = self.inner.state.lock();
            assert_eq!(*state, TaskState::Initial, "ScheduledTask::start: task already started");
            *state = TaskState::Started;
        }
        *self.inner.next_fire.lock() = Some(first_deadline(kind));
        shared.cv.notify_all();
    }

    /// Re-arms the timer for a `Started` or `Limbo` task. Calling this from
    /// inside the task's own worker callback prevents the post-callback
    /// auto-cancel for `OneShot`/`At` tasks (spec §4.3).
    pub fn restart(&self) {
        let Some(shared) = self.inner.scheduler.upgrade() else { return };
        let _guard = shared.tasks.lock();
        if shared.stopped.load(Ordering::Acquire) {
            return;
        }
        let kind = match *self.inner.kind.lock() {
            Some(k) => k,
            None => unreachable!("ScheduledTask::restart: no kind configured"),
        };
        {
            let mut state = self.inner.state.lock();
            assert!(matches!(*state, TaskState::Started | TaskState::Limbo), "ScheduledTask::restart: task not started");
            *state = TaskState::Started;
        }
        *self.inner.next_fire.lock() = Some(first_deadline(kind));
        shared.cv.notify_all();
    }

    /// Stops the timer and marks the slot available for reuse. If the task
    /// is mid-execution, the slot stays reserved until the in-progress flag
    /// clears (spec §4.3 "Cancellation").
    pub fn cancel(&self) {
        let Some(shared) = self.inner.scheduler.upgrade() else { return };
        let _guard = shared.tasks.lock();
        *self.inner.next_fire.lock() = None;
        self.inner.available.store(true, Ordering::Release);
        *self.inner.state.lock() = TaskState::Canceled;
        shared.cv.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        *self.inner.state.lock() == TaskState::Canceled
    }

    pub fn last_run(&self) -> Option<u64> {
        match self.inner.last_executed.load(Ordering::Acquire) {
            0 => None,
            secs => Some(secs),
        }
    }

    pub fn next_run(&self) -> Option<u64> {
        let deadline = (*self.inner.next_fire.lock())?;
        let now = Instant::now();
        let now_epoch = epoch_secs_now();
        Some(if deadline > now { now_epoch + deadline.duration_since(now).as_secs() } else { now_epoch })
    }
}

fn first_deadline(kind: TaskKind) -> Instant {
    match kind {
        TaskKind::OneShot { offset } => Instant::now() + offset,
        TaskKind::Periodic { offset, .. } => Instant::now() + offset,
        TaskKind::At { unix_time } => instant_for_unix_time(unix_time),
    }
}

/// Advances a periodic task's deadline past `now`, skipping missed cycles
/// rather than firing a backlog.
fn advance_periodic(next_fire: &Mutex<Option<Instant>>, interval: Duration, now: Instant) {
    let mut next_fire = next_fire.lock();
    if let Some(mut deadline) = *next_fire {
        while deadline <= now {
            deadline += interval;
        }
        *next_fire = Some(deadline);
    }
}

fn fire_task(shared: &Arc<SchedulerShared>, task: &Arc<TaskInner>, now: Instant) {
    if task.in_progress.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
        if let Some(TaskKind::Periodic { interval, .. }) = *task.kind.lock() {
            advance_periodic(&task.next_fire, interval, now);
        }
        return;
    }
    task.last_executed.store(epoch_secs_now(), Ordering::Release);
    match *task.kind.lock() {
        Some(TaskKind::Periodic { interval, .. }) => advance_periodic(&task.next_fire, interval, now),
        _ => *task.next_fire.lock() = None,
    }
    shared.dispatcher.submit(Arc::clone(task));
}

fn loop_run(shared: Arc<SchedulerShared>) {
    let mut tasks = shared.tasks.lock();
    loop {
        if shared.stopped.load(Ordering::Acquire) {
            return;
        }
        let now = Instant::now();
        let mut earliest: Option<Instant> = None;
        let mut due = Vec::new();
        for task in tasks.iter() {
            if *task.state.lock() != TaskState::Started {
                continue;
            }
            if let Some(deadline) = *task.next_fire.lock() {
                if deadline <= now {
                    due.push(Arc::clone(task));
                } else {
                    earliest = Some(earliest.map_or(deadline, |e: Instant| e.min(deadline)));
                }
            }
        }
        if !due.is_empty() {
            for task in &due {
                fire_task(&shared, task, now);
            }
            continue;
        }
        if shared.stopped.load(Ordering::Acquire) {
            return;
        }
        match earliest {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                shared.cv.wait_for(&mut tasks, remaining);
            }
            None => shared.cv.wait(&mut tasks),
        }
    }
}

/// Wraps a task's worker callback with the Limbo auto-cancel protocol and a
/// panic boundary (spec §4.3 "Dispatch algorithm", "Failure modes").
fn run_task_worker(task: Arc<TaskInner>) {
    let auto_cancels = matches!(*task.kind.lock(), Some(kind) if kind.auto_cancels());
    if auto_cancels {
        *task.state.lock() = TaskState::Limbo;
    }
    let worker = task.worker.lock().clone();
    if let Some(worker) = worker {
        let handle = ScheduledTask { inner: Arc::clone(&task) };
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| worker(&handle))).is_err() {
            tracing::error!(task = %task.name.lock(), "scheduled task worker panicked");
        }
    }
    if *task.state.lock() == TaskState::Limbo {
        task.available.store(true, Ordering::Release);
        *task.state.lock() = TaskState::Canceled;
        *task.next_fire.lock() = None;
    }
    task.in_progress.store(false, Ordering::Release);
}

/// Timer loop, task pool, and Worker Dispatcher bundled together (spec
/// §4.3).
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    loop_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(worker_count: usize) -> Self {
        let dispatcher = Dispatcher::new(worker_count, Duration::from_secs(60), run_task_worker);
        let shared = Arc::new(SchedulerShared { tasks: Mutex::new(Vec::new()), cv: Condvar::new(), stopped: AtomicBool::new(false), dispatcher });
        let loop_shared = Arc::clone(&shared);
        let loop_thread = std::thread::spawn(move || loop_run(loop_shared));
        Self { shared, loop_thread: Mutex::new(Some(loop_thread)) }
    }

    /// Returns a reusable `ScheduledTask` slot: an existing canceled,
    /// non-running slot if one exists, else a freshly allocated one (spec
    /// §4.3 "Contract").
    pub fn allocate(&self, name: impl Into<String>) -> ScheduledTask {
        let name = name.into();
        let mut tasks = self.shared.tasks.lock();
        let reused = tasks.iter().find(|t| t.available.load(Ordering::Acquire) && !t.in_progress.load(Ordering::Acquire)).cloned();
        let inner = match reused {
            Some(slot) => {
                *slot.name.lock() = name;
                slot.available.store(false, Ordering::Release);
                *slot.kind.lock() = None;
                *slot.state.lock() = TaskState::Initial;
                *slot.next_fire.lock() = None;
                slot.last_executed.store(0, Ordering::Release);
                *slot.worker.lock() = None;
                slot
            }
            None => {
                let slot = Arc::new(TaskInner {
                    name: Mutex::new(name),
                    kind: Mutex::new(None),
                    state: Mutex::new(TaskState::Initial),
                    in_progress: AtomicBool::new(false),
                    available: AtomicBool::new(false),
                    next_fire: Mutex::new(None),
                    last_executed: AtomicU64::new(0),
                    worker: Mutex::new(None),
                    scheduler: Arc::downgrade(&self.shared),
                });
                tasks.push(Arc::clone(&slot));
                slot
            }
        };
        ScheduledTask { inner }
    }

    /// Breaks the loop, joins its thread, and drains the task pool and
    /// dispatcher.
    pub fn free(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.cv.notify_all();
        if let Some(handle) = self.loop_thread.lock().take() {
            let _ = handle.join();
        }
        self.shared.dispatcher.free();
        self.shared.tasks.lock().clear();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn one_shot_fires_once_after_offset() {
        let scheduler = Scheduler::new(2);
        let (tx, rx) = mpsc::channel();
        let task = scheduler.allocate("probe");
        task.one_shot(Duration::from_millis(20));
        task.set_worker(move |_| {
            tx.send(()).expect("send");
        });
        task.start();
        rx.recv_timeout(Duration::from_secs(1)).expect("fired");
        std::thread::sleep(Duration::from_millis(100));
        assert!(task.is_canceled());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn periodic_fires_more_than_once() {
        let scheduler = Scheduler::new(2);
        let (tx, rx) = mpsc::channel();
        let task = scheduler.allocate("periodic");
        task.periodic(Duration::from_millis(10), Duration::from_millis(10));
        task.set_worker(move |_| {
            let _ = tx.send(());
        });
        task.start();
        rx.recv_timeout(Duration::from_secs(1)).expect("first fire");
        rx.recv_timeout(Duration::from_secs(1)).expect("second fire");
        task.cancel();
    }

    #[test]
    fn restart_from_inside_worker_prevents_auto_cancel() {
        let scheduler = Scheduler::new(2);
        let (tx, rx) = mpsc::channel();
        let task = scheduler.allocate("restarting");
        task.one_shot(Duration::from_millis(10));
        let fires = Arc::new(AtomicU64::new(0));
        let fires2 = Arc::clone(&fires);
        task.set_worker(move |t| {
            let n = fires2.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                t.restart();
            } else {
                let _ = tx.send(());
            }
        });
        task.start();
        rx.recv_timeout(Duration::from_secs(2)).expect("third fire");
        assert_eq!(fires.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn slow_task_skips_overlapping_firing() {
        let scheduler = Scheduler::new(2);
        let overlap_detected = Arc::new(AtomicBool::new(false));
        let concurrent = Arc::new(AtomicU64::new(0));
        let overlap2 = Arc::clone(&overlap_detected);
        let concurrent2 = Arc::clone(&concurrent);
        let task = scheduler.allocate("slow");
        task.periodic(Duration::from_millis(5), Duration::from_millis(5));
        task.set_worker(move |_| {
            if concurrent2.fetch_add(1, Ordering::SeqCst) > 0 {
                overlap2.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(60));
            concurrent2.fetch_sub(1, Ordering::SeqCst);
        });
        task.start();
        std::thread::sleep(Duration::from_millis(200));
        task.cancel();
        assert!(!overlap_detected.load(Ordering::SeqCst));
    }

    #[test]
    fn allocate_reuses_a_canceled_slot() {
        let scheduler = Scheduler::new(1);
        let task = scheduler.allocate("a");
        task.one_shot(Duration::from_secs(5));
        task.set_worker(|_| {});
        task.start();
        task.cancel();
        let reused = scheduler.allocate("b");
        assert_eq!(reused.name(), "b");
        assert_eq!(scheduler.shared.tasks.lock().len(), 1, "allocate should have reused the canceled slot, not grown the pool");
    }
}
