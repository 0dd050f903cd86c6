//! Worker pools for the Harrow pipeline.
//!
//! A [`WorkerPool`] is a fixed-size set of tokio tasks draining one shared,
//! unbounded queue. Each worker owns a private resource (typically a database
//! handle) obtained from the [`Processor`] at startup, so stateful handles are
//! never shared across workers.
//!
//! Shutdown is cooperative: any worker can stop its pool through the
//! [`PoolHandle`], in-flight items finish, and no new items are pulled.
//! Producers watch [`WorkerPool::depth`] for backpressure.

mod cancel;
mod retry;

pub use cancel::CancelToken;
pub use retry::{retry, RetryPolicy};

use anyhow::Context as _;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// How long an idle worker parks before re-checking the queue and the
/// running flag.
const IDLE_PARK: Duration = Duration::from_millis(200);

/// Poll interval for [`WorkerPool::wait_until_drained`].
const DRAIN_POLL: Duration = Duration::from_millis(300);

/// Outcome of processing one item.
///
/// `Shutdown` is the dedicated "stop this pool" signal; it is not an ordinary
/// per-item failure. Ordinary failures are logged and the pool moves on.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The worker hit a condition the whole pool cannot continue past.
    #[error("pool shutdown requested: {0}")]
    Shutdown(String),

    /// Per-item failure; the item is dropped and the pool keeps running.
    #[error(transparent)]
    Task(#[from] anyhow::Error),
}

/// Handler plus per-worker resource factory for a pool.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    type Item: Send + 'static;
    type Resource: Send + 'static;

    /// Build the private resource for one worker. Called once per worker
    /// before the pool starts accepting its items; a failure here aborts
    /// pool startup.
    async fn setup(&self, worker: usize) -> anyhow::Result<Self::Resource>;

    /// Handle one item with the worker's private resource.
    async fn process(
        &self,
        item: Self::Item,
        resource: &mut Self::Resource,
        pool: &PoolHandle,
    ) -> Result<(), TaskError>;
}

/// Item-type-independent pool state shared between workers and producers.
struct Control {
    name: String,
    running: AtomicBool,
    notify: Notify,
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    processed: AtomicU64,
}

/// View of a pool given to processors, enough to request cooperative
/// shutdown and to check whether the pool is still accepting work.
#[derive(Clone)]
pub struct PoolHandle {
    control: Arc<Control>,
}

impl PoolHandle {
    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::SeqCst)
    }

    /// Stop the pool: no new items are pulled, in-flight items finish.
    pub fn shutdown(&self) {
        self.control.running.store(false, Ordering::SeqCst);
        self.control.notify.notify_waiters();
    }
}

struct Shared<T> {
    control: Arc<Control>,
    queue: Mutex<VecDeque<T>>,
}

impl<T> Shared<T> {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A worker panicking mid-push cannot leave the deque inconsistent.
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fixed-size pool of concurrent executors over one shared queue.
pub struct WorkerPool<T> {
    shared: Arc<Shared<T>>,
    control: Arc<Control>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `size` workers (at least one), each with its own resource from
    /// `processor.setup`. Resource acquisition failures abort startup.
    pub async fn start<P>(
        name: impl Into<String>,
        size: usize,
        processor: Arc<P>,
    ) -> anyhow::Result<Self>
    where
        P: Processor<Item = T>,
    {
        let size = size.max(1);
        let control = Arc::new(Control {
            name: name.into(),
            running: AtomicBool::new(true),
            notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            processed: AtomicU64::new(0),
        });
        let shared = Arc::new(Shared {
            control: Arc::clone(&control),
            queue: Mutex::new(VecDeque::new()),
        });

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let resource = processor.setup(index).await.with_context(|| {
                format!(
                    "worker {index} of pool '{}' failed to acquire its resource",
                    control.name
                )
            })?;
            workers.push(tokio::spawn(worker_loop(
                Arc::clone(&shared),
                Arc::clone(&processor),
                resource,
                index,
            )));
        }

        debug!(pool = %control.name, size, "worker pool started");
        Ok(Self {
            shared,
            control,
            workers: Mutex::new(workers),
        })
    }

    /// Enqueue an item without blocking.
    pub fn submit(&self, item: T) {
        self.shared.lock_queue().push_back(item);
        self.control.submitted.fetch_add(1, Ordering::Relaxed);
        self.control.notify.notify_one();
    }

    /// Current queue length, for producer backpressure decisions.
    pub fn depth(&self) -> usize {
        self.shared.lock_queue().len()
    }

    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::SeqCst)
    }

    /// Items fully processed so far.
    pub fn processed(&self) -> u64 {
        self.control.processed.load(Ordering::Relaxed)
    }

    /// Items ever submitted.
    pub fn submitted(&self) -> u64 {
        self.control.submitted.load(Ordering::Relaxed)
    }

    /// A handle producers or collaborating loops can keep to observe and
    /// stop this pool without owning it.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// Block until the queue is empty and no worker is mid-task, or until
    /// the pool stops running.
    pub async fn wait_until_drained(&self) {
        loop {
            if !self.is_running() {
                return;
            }
            let empty = self.shared.lock_queue().is_empty();
            if empty && self.control.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }

    /// Request cooperative shutdown.
    pub fn shutdown(&self) {
        self.control.running.store(false, Ordering::SeqCst);
        self.control.notify.notify_waiters();
    }

    /// Shut down and reap all workers.
    pub async fn join(&self) {
        self.shutdown();
        let handles: Vec<_> = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(pool = %self.control.name, error = %err, "worker task aborted");
            }
        }
    }
}

async fn worker_loop<P: Processor>(
    shared: Arc<Shared<P::Item>>,
    processor: Arc<P>,
    mut resource: P::Resource,
    index: usize,
) {
    let control = Arc::clone(&shared.control);
    let handle = PoolHandle {
        control: Arc::clone(&control),
    };

    loop {
        if !control.running.load(Ordering::SeqCst) {
            break;
        }

        // in_flight is raised under the queue lock, so a drain check can
        // never observe an empty queue while an item is in hand.
        let item = {
            let mut queue = shared.lock_queue();
            let item = queue.pop_front();
            if item.is_some() {
                control.in_flight.fetch_add(1, Ordering::SeqCst);
            }
            item
        };
        let Some(item) = item else {
            tokio::select! {
                _ = control.notify.notified() => {}
                _ = tokio::time::sleep(IDLE_PARK) => {}
            }
            continue;
        };

        let result = processor.process(item, &mut resource, &handle).await;
        control.in_flight.fetch_sub(1, Ordering::SeqCst);
        control.processed.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(()) => {}
            Err(TaskError::Shutdown(reason)) => {
                error!(pool = %control.name, worker = index, %reason, "worker requested pool shutdown");
                handle.shutdown();
            }
            Err(TaskError::Task(err)) => {
                warn!(pool = %control.name, worker = index, error = %format!("{err:#}"), "item failed");
            }
        }
    }

    debug!(pool = %control.name, worker = index, "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct Summing {
        total: Arc<AtomicU64>,
        delay: Duration,
    }

    #[async_trait]
    impl Processor for Summing {
        type Item = u64;
        type Resource = u64; // worker index, to prove per-worker affinity

        async fn setup(&self, worker: usize) -> anyhow::Result<Self::Resource> {
            Ok(worker as u64)
        }

        async fn process(
            &self,
            item: u64,
            _resource: &mut u64,
            _pool: &PoolHandle,
        ) -> Result<(), TaskError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.total.fetch_add(item, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drains_all_items() {
        let total = Arc::new(AtomicU64::new(0));
        let pool = WorkerPool::start(
            "sum",
            4,
            Arc::new(Summing {
                total: Arc::clone(&total),
                delay: Duration::ZERO,
            }),
        )
        .await
        .unwrap();

        for i in 1..=100u64 {
            pool.submit(i);
        }
        pool.wait_until_drained().await;
        pool.join().await;

        assert_eq!(total.load(Ordering::SeqCst), 5050);
        assert_eq!(pool.processed(), 100);
        assert_eq!(pool.depth(), 0);
    }

    struct StopOnPoison;

    #[async_trait]
    impl Processor for StopOnPoison {
        type Item = i32;
        type Resource = ();

        async fn setup(&self, _worker: usize) -> anyhow::Result<()> {
            Ok(())
        }

        async fn process(
            &self,
            item: i32,
            _resource: &mut (),
            _pool: &PoolHandle,
        ) -> Result<(), TaskError> {
            if item < 0 {
                return Err(TaskError::Shutdown("poison item".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_request_stops_the_pool() {
        let pool = WorkerPool::start("stop", 1, Arc::new(StopOnPoison)).await.unwrap();
        pool.submit(1);
        pool.submit(-1);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while pool.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!pool.is_running(), "poison item should stop the pool");
        pool.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn depth_reflects_backlog() {
        let total = Arc::new(AtomicU64::new(0));
        let pool = WorkerPool::start(
            "slow",
            1,
            Arc::new(Summing {
                total,
                delay: Duration::from_millis(50),
            }),
        )
        .await
        .unwrap();

        for i in 0..20u64 {
            pool.submit(i);
        }
        // One worker at 50ms/item cannot have drained 20 items instantly.
        assert!(pool.depth() > 10);
        pool.wait_until_drained().await;
        assert_eq!(pool.depth(), 0);
        pool.join().await;
    }
}
