//! Thread-pool bulkhead.
//!
//! Operations run on a bounded set of worker threads fed by a bounded queue.
//! Submission never blocks: it starts a core worker if fewer than
//! `core_thread_pool_size` are alive, otherwise queues the task, otherwise
//! starts an extra worker up to `max_thread_pool_size`, and otherwise fails
//! with [`BulkheadFullError`].

use crate::config::ThreadPoolBulkheadConfig;
use crate::error::BulkheadFullError;
use crate::events::BulkheadEvent;
use fortify_core::promise::{self, Abandoned, Completion, Pending, WaitError};
use fortify_core::{EventPublisher, Registrable, ResilienceError};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::task::{Context, Poll};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Point-in-time view of a thread-pool bulkhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPoolBulkheadMetrics {
    /// Configured core size.
    pub core_thread_pool_size: usize,
    /// Configured maximum size.
    pub max_thread_pool_size: usize,
    /// Workers currently alive.
    pub thread_pool_size: usize,
    /// Workers currently running a task.
    pub active_thread_count: usize,
    /// Tasks waiting for a worker.
    pub queue_depth: usize,
    /// Configured queue capacity.
    pub queue_capacity: usize,
    /// Free queue slots.
    pub remaining_queue_capacity: usize,
}

struct Workers {
    name: String,
    config: ThreadPoolBulkheadConfig,
    receiver: Mutex<Receiver<Job>>,
    threads: AtomicUsize,
    active: AtomicUsize,
    queued: AtomicUsize,
    spawned: AtomicUsize,
    events: EventPublisher<BulkheadEvent>,
}

impl Workers {
    fn run(&self, job: Job) {
        self.active.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        job();
        self.active.fetch_sub(1, Ordering::SeqCst);

        let duration = started.elapsed();

        #[cfg(feature = "metrics")]
        metrics::histogram!("bulkhead_call_duration_seconds", "bulkhead" => self.name.clone())
            .record(duration.as_secs_f64());

        self.events.emit(&BulkheadEvent::CallFinished {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            duration,
        });
    }

    /// Gives up the worker slot if the pool is above its core size.
    fn try_retire(&self) -> bool {
        let core = self.config.core_thread_pool_size;
        self.threads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                (t > core).then(|| t - 1)
            })
            .is_ok()
    }

    fn work(self: Arc<Self>, first: Job) {
        self.run(first);
        loop {
            let next = {
                let receiver = fortify_core::lock(&self.receiver);
                receiver.recv_timeout(self.config.keep_alive_duration)
            };
            match next {
                Ok(job) => {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    self.run(job);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.try_retire() {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.threads.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs operations on a bounded worker pool.
pub struct ThreadPoolBulkhead {
    workers: Arc<Workers>,
    sender: RwLock<Option<SyncSender<Job>>>,
    dispatch: Mutex<()>,
    shut_down: AtomicBool,
}

impl ThreadPoolBulkhead {
    /// Creates an idle pool; workers start on demand.
    pub fn new(name: impl Into<String>, config: ThreadPoolBulkheadConfig) -> Self {
        #[cfg(feature = "metrics")]
        crate::semaphore::describe_metrics();

        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity);
        Self {
            workers: Arc::new(Workers {
                name: name.into(),
                config,
                receiver: Mutex::new(receiver),
                threads: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                spawned: AtomicUsize::new(0),
                events: EventPublisher::new(),
            }),
            sender: RwLock::new(Some(sender)),
            dispatch: Mutex::new(()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Creates a pool with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, ThreadPoolBulkheadConfig::default())
    }

    /// The pool's name.
    pub fn name(&self) -> &str {
        &self.workers.name
    }

    /// The pool's configuration.
    pub fn config(&self) -> &ThreadPoolBulkheadConfig {
        &self.workers.config
    }

    /// The publisher listeners can subscribe to.
    pub fn event_publisher(&self) -> &EventPublisher<BulkheadEvent> {
        &self.workers.events
    }

    /// Subscribes to every event.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&BulkheadEvent) + Send + Sync + 'static,
    {
        self.workers.events.subscribe_fn(f);
    }

    /// Current pool and queue occupancy.
    pub fn metrics(&self) -> ThreadPoolBulkheadMetrics {
        let config = &self.workers.config;
        let queue_depth = self.workers.queued.load(Ordering::SeqCst);
        ThreadPoolBulkheadMetrics {
            core_thread_pool_size: config.core_thread_pool_size,
            max_thread_pool_size: config.max_thread_pool_size,
            thread_pool_size: self.workers.threads.load(Ordering::SeqCst),
            active_thread_count: self.workers.active.load(Ordering::SeqCst),
            queue_depth,
            queue_capacity: config.queue_capacity,
            remaining_queue_capacity: config.queue_capacity.saturating_sub(queue_depth),
        }
    }

    /// Submits an operation.
    ///
    /// Fails immediately with [`BulkheadFullError`] when every worker is
    /// busy and the queue is full, or after [`shutdown`](Self::shutdown).
    pub fn submit<R, F>(&self, f: F) -> Result<BulkheadTask<R>, BulkheadFullError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, completion) = promise::channel::<thread::Result<R>>();
        let job: Job = Box::new(move || {
            if promise.is_cancelled() {
                return;
            }
            promise.complete(panic::catch_unwind(AssertUnwindSafe(f)));
        });
        self.dispatch(job)?;
        Ok(BulkheadTask { completion })
    }

    fn dispatch(&self, job: Job) -> Result<(), BulkheadFullError> {
        let accepted = {
            let sender = fortify_core::read(&self.sender);
            match sender.as_ref() {
                Some(sender) => self.place(sender, job),
                None => false,
            }
        };
        if accepted {
            self.permitted();
            Ok(())
        } else {
            Err(self.rejected())
        }
    }

    fn place(&self, sender: &SyncSender<Job>, job: Job) -> bool {
        let config = &self.workers.config;
        let _dispatch = fortify_core::lock(&self.dispatch);

        if self.workers.threads.load(Ordering::SeqCst) < config.core_thread_pool_size {
            return self.spawn_worker(job);
        }

        self.workers.queued.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                self.workers.queued.fetch_sub(1, Ordering::SeqCst);
                self.workers.threads.load(Ordering::SeqCst) < config.max_thread_pool_size
                    && self.spawn_worker(job)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.workers.queued.fetch_sub(1, Ordering::SeqCst);
                false
            }
        }
    }

    fn spawn_worker(&self, first: Job) -> bool {
        self.workers.threads.fetch_add(1, Ordering::SeqCst);
        let id = self.workers.spawned.fetch_add(1, Ordering::Relaxed);
        let workers = Arc::clone(&self.workers);
        let spawned = thread::Builder::new()
            .name(format!("{}-bulkhead-{}", self.workers.name, id))
            .spawn(move || workers.work(first));

        if let Err(_err) = spawned {
            self.workers.threads.fetch_sub(1, Ordering::SeqCst);

            #[cfg(feature = "tracing")]
            warn!(bulkhead = %self.workers.name, error = %_err, "failed to start bulkhead worker");

            return false;
        }
        true
    }

    fn permitted(&self) {
        let concurrent_calls =
            self.workers.active.load(Ordering::SeqCst) + self.workers.queued.load(Ordering::SeqCst);

        #[cfg(feature = "tracing")]
        debug!(bulkhead = %self.workers.name, concurrent_calls, "thread-pool bulkhead task accepted");

        #[cfg(feature = "metrics")]
        {
            counter!("bulkhead_calls_permitted_total", "bulkhead" => self.workers.name.clone())
                .increment(1);
            gauge!("bulkhead_queue_depth", "bulkhead" => self.workers.name.clone())
                .set(self.workers.queued.load(Ordering::SeqCst) as f64);
        }

        self.workers.events.emit(&BulkheadEvent::CallPermitted {
            pattern_name: self.workers.name.clone(),
            timestamp: Instant::now(),
            concurrent_calls,
        });
    }

    fn rejected(&self) -> BulkheadFullError {
        let max_concurrent_calls = self.workers.config.max_thread_pool_size;

        #[cfg(feature = "tracing")]
        warn!(bulkhead = %self.workers.name, "thread-pool bulkhead full");

        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_rejected_total", "bulkhead" => self.workers.name.clone())
            .increment(1);

        self.workers.events.emit(&BulkheadEvent::CallRejected {
            pattern_name: self.workers.name.clone(),
            timestamp: Instant::now(),
            max_concurrent_calls,
        });
        BulkheadFullError {
            name: self.workers.name.clone(),
            max_concurrent_calls,
        }
    }

    fn full_error(&self) -> BulkheadFullError {
        BulkheadFullError {
            name: self.workers.name.clone(),
            max_concurrent_calls: self.workers.config.max_thread_pool_size,
        }
    }

    /// Runs `f` on the pool and blocks until it finishes.
    pub fn execute_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.call_sync(move || f().map_err(ResilienceError::Application))
    }

    /// Runs an already-decorated operation on the pool and blocks until it finishes.
    pub fn call_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, ResilienceError<E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let task = self.submit(f)?;
        task.wait()
            .unwrap_or_else(|Abandoned| Err(self.full_error().into()))
    }

    /// Runs `f` on the pool; the returned future resolves when it finishes.
    pub async fn execute<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.call(move || f().map_err(ResilienceError::Application))
            .await
    }

    /// Runs an already-decorated operation on the pool asynchronously.
    pub async fn call<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, ResilienceError<E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let task = self.submit(f)?;
        match task.await {
            Ok(result) => result,
            Err(Abandoned) => Err(self.full_error().into()),
        }
    }

    /// Stops accepting work. Queued tasks still run; idle workers exit.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        fortify_core::write(&self.sender).take();

        #[cfg(feature = "tracing")]
        debug!(bulkhead = %self.workers.name, "thread-pool bulkhead shut down");
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ThreadPoolBulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolBulkhead")
            .field("name", &self.workers.name)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl Registrable for ThreadPoolBulkhead {
    type Config = ThreadPoolBulkheadConfig;
    const KIND: &'static str = "thread_pool_bulkhead";

    fn create(name: &str, config: &ThreadPoolBulkheadConfig) -> Self {
        ThreadPoolBulkhead::new(name, config.clone())
    }

    fn name(&self) -> &str {
        &self.workers.name
    }

    fn shutdown(&self) {
        ThreadPoolBulkhead::shutdown(self);
    }
}

/// Handle to a submitted operation.
///
/// Await it, or block on it with [`wait`](Self::wait) /
/// [`wait_timeout`](Self::wait_timeout). A panic inside the operation is
/// resumed on the waiting side. Dropping or cancelling the handle before a
/// worker picks the task up stops it from running; use
/// [`detach`](Self::detach) to let it run unobserved.
pub struct BulkheadTask<R> {
    completion: Completion<thread::Result<R>>,
}

impl<R> fmt::Debug for BulkheadTask<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadTask").finish_non_exhaustive()
    }
}

fn unwind<R>(result: thread::Result<R>) -> R {
    match result {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

impl<R> BulkheadTask<R> {
    /// Blocks until the operation finishes.
    pub fn wait(self) -> Result<R, Abandoned> {
        let BulkheadTask { completion } = self;
        completion.wait().map(unwind)
    }

    /// Blocks for at most `timeout`.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<R, WaitError> {
        self.completion.wait_timeout(timeout).map(unwind)
    }

    /// Prevents the operation from starting if it has not started yet.
    pub fn cancel(&self) {
        self.completion.cancel();
    }

    /// Lets the operation run without anyone waiting for it.
    pub fn detach(self) {
        let BulkheadTask { completion } = self;
        completion.detach();
    }

    /// Returns `true` once the operation finished (or will never run).
    pub fn is_finished(&self) -> bool {
        self.completion.is_settled()
    }
}

impl<R> Future for BulkheadTask<R> {
    type Output = Result<R, Abandoned>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.completion).poll(cx).map_ok(unwind)
    }
}

impl<R> Pending for BulkheadTask<R> {
    type Output = R;

    fn wait_until(&mut self, deadline: Instant) -> Result<R, WaitError> {
        self.completion.wait_until(deadline).map(unwind)
    }

    fn cancel(&self) {
        BulkheadTask::cancel(self);
    }

    fn detach(self) {
        BulkheadTask::detach(self);
    }
}
