//! C13: Render Thread — a single worker draining a FIFO of closures,
//! with monotonic submission/processed counters so callers can block
//! until a specific submission has been executed (§4.13).
//!
//! Grounded in `original_source/Core/RenderThread.h` (submission id,
//! `sync(id)`, the `maxPendingSubmissions` pacing in `present`) and the
//! teacher's single-writer-thread pattern in `vulkan/mod.rs` for how GPU
//! submission is serialized onto one OS thread.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    not_empty: Condvar,
    counters: Mutex<Counters>,
    processed_cv: Condvar,
    running: std::sync::atomic::AtomicBool,
}

struct Counters {
    submitted: u64,
    processed: u64,
}

/// A single worker thread with a FIFO of closures (§4.13). Submitting a
/// task returns a monotonic id; `sync(id)` blocks until that id (and every
/// id before it) has been processed.
pub struct RenderThread {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RenderThread {
    fn new() -> RenderThread {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            counters: Mutex::new(Counters {
                submitted: 0,
                processed: 0,
            }),
            processed_cv: Condvar::new(),
            running: std::sync::atomic::AtomicBool::new(true),
        });

        let worker_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("render-thread".into())
            .spawn(move || Self::worker_loop(worker_shared))
            .expect("failed to spawn render thread");

        RenderThread {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    fn worker_loop(shared: Arc<Shared>) {
        loop {
            let task = {
                let mut queue = shared.queue.lock().unwrap();
                loop {
                    if let Some(task) = queue.pop_front() {
                        break Some(task);
                    }
                    if !shared.running.load(std::sync::atomic::Ordering::Acquire) {
                        break None;
                    }
                    queue = shared.not_empty.wait(queue).unwrap();
                }
            };
            let Some(task) = task else { break };
            task();
            let mut counters = shared.counters.lock().unwrap();
            counters.processed += 1;
            shared.processed_cv.notify_all();
        }
    }

    /// Process-wide singleton; lifecycle tied to first access (§4.13).
    pub fn get() -> &'static RenderThread {
        static INSTANCE: OnceLock<RenderThread> = OnceLock::new();
        INSTANCE.get_or_init(RenderThread::new)
    }

    /// Enqueues `f` and returns its monotonic submission id.
    pub fn add_task(&self, f: impl FnOnce() + Send + 'static) -> u64 {
        let id = {
            let mut counters = self.shared.counters.lock().unwrap();
            counters.submitted += 1;
            counters.submitted
        };
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(Box::new(f));
        self.shared.not_empty.notify_one();
        id
    }

    /// Blocks until `processed >= id`.
    pub fn sync(&self, id: u64) {
        let mut counters = self.shared.counters.lock().unwrap();
        while counters.processed < id {
            counters = self.shared.processed_cv.wait(counters).unwrap();
        }
    }

    pub fn processed(&self) -> u64 {
        self.shared.counters.lock().unwrap().processed
    }

    pub fn submitted(&self) -> u64 {
        self.shared.counters.lock().unwrap().submitted
    }

    /// §4.13: `present` caps the submission-minus-processed gap to
    /// `max_pending` by syncing when it is exceeded, bounding in-flight
    /// work regardless of how fast the producer enqueues frames.
    pub fn pace(&self, max_pending: u64) {
        let submitted = self.submitted();
        if submitted > max_pending {
            self.sync(submitted - max_pending);
        }
    }
}

impl Drop for RenderThread {
    /// Signals shutdown and joins, waking both condition variables so a
    /// blocked `sync` or an idle worker both observe `running == false`.
    fn drop(&mut self) {
        self.shared.running.store(false, std::sync::atomic::Ordering::Release);
        self.shared.not_empty.notify_all();
        self.shared.processed_cv.notify_all();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn sync_waits_for_exact_task_and_no_later() {
        let thread = RenderThread::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut ids = Vec::new();
        for i in 0..10u64 {
            let order = order.clone();
            ids.push(thread.add_task(move || {
                order.lock().unwrap().push(i);
            }));
        }
        thread.sync(ids[4]);
        let completed = order.lock().unwrap().len();
        assert!(completed >= 5);
        thread.sync(ids[9]);
        assert_eq!(order.lock().unwrap().len(), 10);
    }

    #[test]
    fn ordering_is_fifo() {
        let thread = RenderThread::new();
        let counter = Arc::new(AtomicU64::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut last_id = 0;
        for _ in 0..20 {
            let counter = counter.clone();
            let seen = seen.clone();
            last_id = thread.add_task(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(n);
            });
        }
        thread.sync(last_id);
        let seen = seen.lock().unwrap();
        let sorted: Vec<u64> = {
            let mut v = seen.clone();
            v.sort();
            v
        };
        assert_eq!(*seen, sorted);
    }

    #[test]
    fn pacing_syncs_when_gap_exceeds_cap() {
        let thread = RenderThread::new();
        for _ in 0..5 {
            thread.add_task(|| {});
        }
        thread.pace(2);
        assert!(thread.processed() >= thread.submitted() - 2);
    }
}
