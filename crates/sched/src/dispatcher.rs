//! Worker Dispatcher: an elastic OS-thread pool (spec §4.2).
//!
//! Grounded in libmonit's `Dispatcher.c` worker-queue design ("Programming
//! with POSIX Threads", Butenhof): idle-vs-queue-length heuristic to decide
//! between waking an idle worker and spawning a new one, and a
//! timed-condvar-wait shrink-on-idle policy.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct State<T> {
    work: VecDeque<T>,
    idle: usize,
    counter: usize,
    quit: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    cv: Condvar,
    parallelism: usize,
    idle_timeout: Duration,
    engine: Box<dyn Fn(T) + Send + Sync>,
}

/// A bounded pool of OS threads that runs `engine` once per submitted item.
pub struct Dispatcher<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Dispatcher<T> {
    /// `max_threads` bounds live worker threads; `idle_timeout` is how long
    /// an idle worker waits for work before exiting (spec §4.2).
    pub fn new(max_threads: usize, idle_timeout: Duration, engine: impl Fn(T) + Send + Sync + 'static) -> Self {
        assert!(max_threads > 0, "Dispatcher: max_threads must be positive");
        let shared = Arc::new(Shared {
            state: Mutex::new(State { work: VecDeque::new(), idle: 0, counter: 0, quit: false }),
            cv: Condvar::new(),
            parallelism: max_threads,
            idle_timeout,
            engine: Box::new(engine),
        });
        Self { shared }
    }

    /// Enqueue one item of work. Wakes an idle worker if one exists, else
    /// spawns a new worker thread if under `max_threads` (spec §4.2
    /// "Scheduling model").
    pub fn submit(&self, item: T) {
        let mut state = self.shared.state.lock();
        state.work.push_back(item);
        if state.idle >= state.work.len() {
            self.shared.cv.notify_one();
        } else if state.counter < self.shared.parallelism {
            state.counter += 1;
            let shared = Arc::clone(&self.shared);
            std::thread::spawn(move || worker_loop(shared));
        }
    }

    /// Waits for all in-flight and queued work to drain, then stops every
    /// worker thread.
    pub fn free(&self) {
        let mut state = self.shared.state.lock();
        if state.counter == 0 {
            return;
        }
        state.quit = true;
        if state.idle > 0 {
            self.shared.cv.notify_all();
        }
        while state.counter > 0 {
            self.shared.cv.wait(&mut state);
        }
    }
}

impl<T: Send + 'static> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        self.free();
    }
}

fn worker_loop<T: Send + 'static>(shared: Arc<Shared<T>>) {
    let mut state = shared.state.lock();
    loop {
        let mut timed_out = false;
        while state.work.is_empty() && !state.quit {
            state.idle += 1;
            let result = shared.cv.wait_for(&mut state, shared.idle_timeout);
            state.idle -= 1;
            if result.timed_out() {
                timed_out = true;
                break;
            }
        }
        if let Some(item) = state.work.pop_front() {
            parking_lot::MutexGuard::unlocked(&mut state, || (shared.engine)(item));
        }
        if state.work.is_empty() && state.quit {
            state.counter -= 1;
            if state.counter == 0 {
                shared.cv.notify_all();
            }
            return;
        }
        if state.work.is_empty() && timed_out {
            state.counter -= 1;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn submitted_work_runs_exactly_once() {
        let (tx, rx) = mpsc::channel();
        let dispatcher = Dispatcher::new(4, Duration::from_millis(50), move |item: u32| {
            tx.send(item).expect("send");
        });
        for i in 0..10 {
            dispatcher.submit(i);
        }
        dispatcher.free();
        let mut received: Vec<u32> = rx.try_iter().collect();
        received.sort_unstable();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn respects_max_threads_bound() {
        let live = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let live2 = Arc::clone(&live);
        let max_seen2 = Arc::clone(&max_seen);
        let dispatcher = Dispatcher::new(2, Duration::from_millis(200), move |_: ()| {
            let now = live2.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen2.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            live2.fetch_sub(1, Ordering::SeqCst);
        });
        for _ in 0..8 {
            dispatcher.submit(());
        }
        dispatcher.free();
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn idle_worker_exits_after_timeout() {
        let dispatcher: Dispatcher<()> = Dispatcher::new(4, Duration::from_millis(20), |_| {});
        dispatcher.submit(());
        std::thread::sleep(Duration::from_millis(100));
        let state = dispatcher.shared.state.lock();
        assert_eq!(state.counter, 0);
    }
}
