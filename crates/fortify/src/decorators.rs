//! Composition of resilience primitives around one operation.
//!
//! Every `with_*` call wraps everything declared before it. Unless
//! [`preserve_declaration_order`](Decorate::preserve_declaration_order) is
//! set, stages are sorted into the canonical order, innermost first:
//!
//! 1. thread-pool bulkhead (executes the operation)
//! 2. bulkhead
//! 3. rate limiter
//! 4. time limiter
//! 5. circuit breaker
//! 6. retry
//!
//! so the retry loop runs outermost and every attempt passes circuit breaker,
//! time limiter and bulkhead admission again. A fallback, if any, resolves
//! the final error.

use fortify_bulkhead::{Bulkhead, ThreadPoolBulkhead};
use fortify_circuitbreaker::CircuitBreaker;
use fortify_core::ResilienceError;
use fortify_fallback::Fallback;
use fortify_ratelimiter::RateLimiter;
use fortify_retry::Retry;
use fortify_timelimiter::TimeLimiter;
use futures::future::BoxFuture;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::panic;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::debug;

type SyncOperation<T, E> = Arc<dyn Fn() -> Result<T, ResilienceError<E>> + Send + Sync>;
type AsyncOperation<T, E> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, ResilienceError<E>>> + Send + Sync>;

/// A synchronous operation waiting to be decorated.
pub struct Supplier<T, E>(SyncOperation<T, E>);

/// An asynchronous operation waiting to be decorated.
pub struct FutureSupplier<T, E>(AsyncOperation<T, E>);

#[derive(Clone)]
enum Stage {
    ThreadPoolBulkhead(Arc<ThreadPoolBulkhead>),
    Bulkhead(Arc<Bulkhead>),
    RateLimiter(Arc<RateLimiter>),
    TimeLimiter(Arc<TimeLimiter>),
    CircuitBreaker(Arc<CircuitBreaker>),
    Retry(Arc<Retry>),
}

impl Stage {
    fn rank(&self) -> u8 {
        match self {
            Stage::ThreadPoolBulkhead(_) => 0,
            Stage::Bulkhead(_) => 1,
            Stage::RateLimiter(_) => 2,
            Stage::TimeLimiter(_) => 3,
            Stage::CircuitBreaker(_) => 4,
            Stage::Retry(_) => 5,
        }
    }

    fn label(&self) -> String {
        match self {
            Stage::ThreadPoolBulkhead(p) => format!("thread_pool_bulkhead({})", p.name()),
            Stage::Bulkhead(b) => format!("bulkhead({})", b.name()),
            Stage::RateLimiter(r) => format!("ratelimiter({})", r.name()),
            Stage::TimeLimiter(t) => format!("timelimiter({})", t.name()),
            Stage::CircuitBreaker(c) => format!("circuitbreaker({})", c.name()),
            Stage::Retry(r) => format!("retry({})", r.name()),
        }
    }
}

/// Entry point of the composer.
///
/// # Examples
///
/// ```
/// use fortify::{CircuitBreaker, Decorators, Retry, RetryConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let breaker = Arc::new(CircuitBreaker::of_defaults("inventory"));
/// let retry = Arc::new(Retry::new(
///     "inventory",
///     RetryConfig::builder().wait_duration(Duration::from_millis(1)).build(),
/// ));
///
/// let lookup = Decorators::of_supplier(|| Ok::<_, std::io::Error>(42))
///     .with_circuit_breaker(breaker)
///     .with_retry(retry)
///     .decorate();
///
/// assert_eq!(lookup.invoke().unwrap(), 42);
/// ```
pub struct Decorators;

impl Decorators {
    /// Decorates a synchronous operation.
    ///
    /// The operation may run more than once (under retry) and on another
    /// thread (under a thread-pool bulkhead or time limiter).
    pub fn of_supplier<T, E, F>(f: F) -> Decorate<Supplier<T, E>, T, E>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        Decorate::new(Supplier(Arc::new(move || {
            f().map_err(ResilienceError::Application)
        })))
    }

    /// Decorates an asynchronous operation.
    ///
    /// `f` is called once per attempt to produce a fresh future.
    pub fn of_future<T, E, F, Fut>(f: F) -> Decorate<FutureSupplier<T, E>, T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Decorate::new(FutureSupplier(Arc::new(move || {
            let attempt = f();
            Box::pin(async move { attempt.await.map_err(ResilienceError::Application) })
        })))
    }
}

/// Collects the stages for one operation.
pub struct Decorate<O, T, E> {
    operation: O,
    stages: Vec<Stage>,
    preserve_order: bool,
    fallback: Option<Arc<Fallback<T, E>>>,
}

impl<O, T, E> Decorate<O, T, E> {
    fn new(operation: O) -> Self {
        Self {
            operation,
            stages: Vec::new(),
            preserve_order: false,
            fallback: None,
        }
    }

    fn push(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Limits concurrent executions with a semaphore bulkhead.
    pub fn with_bulkhead(self, bulkhead: Arc<Bulkhead>) -> Self {
        self.push(Stage::Bulkhead(bulkhead))
    }

    /// Runs the operation on a thread-pool bulkhead.
    ///
    /// The pool always sits innermost because it executes the operation.
    /// Only one pool can run it, so a second call replaces the first.
    pub fn with_thread_pool_bulkhead(mut self, bulkhead: Arc<ThreadPoolBulkhead>) -> Self {
        self.stages
            .retain(|stage| !matches!(stage, Stage::ThreadPoolBulkhead(_)));
        self.push(Stage::ThreadPoolBulkhead(bulkhead))
    }

    /// Throttles attempts with a rate limiter.
    pub fn with_rate_limiter(self, limiter: Arc<RateLimiter>) -> Self {
        self.push(Stage::RateLimiter(limiter))
    }

    /// Bounds each attempt with a deadline.
    pub fn with_time_limiter(self, limiter: Arc<TimeLimiter>) -> Self {
        self.push(Stage::TimeLimiter(limiter))
    }

    /// Guards attempts with a circuit breaker.
    pub fn with_circuit_breaker(self, breaker: Arc<CircuitBreaker>) -> Self {
        self.push(Stage::CircuitBreaker(breaker))
    }

    /// Retries failed attempts.
    pub fn with_retry(self, retry: Arc<Retry>) -> Self {
        self.push(Stage::Retry(retry))
    }

    /// Resolves the final error through `fallback`.
    pub fn with_fallback(mut self, fallback: Arc<Fallback<T, E>>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Keeps stages in `with_*` order instead of the canonical one.
    ///
    /// A thread-pool bulkhead still sits innermost.
    pub fn preserve_declaration_order(mut self) -> Self {
        self.preserve_order = true;
        self
    }

    fn ordered_stages(&mut self) -> Vec<Stage> {
        let mut stages = std::mem::take(&mut self.stages);
        if self.preserve_order {
            // stable: the pool moves to the front, everything else keeps its place
            stages.sort_by_key(|stage| !matches!(stage, Stage::ThreadPoolBulkhead(_)));
        } else {
            stages.sort_by_key(Stage::rank);
        }

        #[cfg(feature = "tracing")]
        debug!(
            stages = ?stages.iter().map(Stage::label).collect::<Vec<_>>(),
            "decorated operation, innermost first"
        );

        stages
    }
}

impl<T, E> Decorate<Supplier<T, E>, T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    /// Builds the decorated operation.
    pub fn decorate(mut self) -> Decorated<T, E> {
        let stages = self.ordered_stages();
        Decorated {
            chain: Arc::new(SyncChain {
                operation: self.operation.0,
                stages,
            }),
            fallback: self.fallback,
        }
    }
}

impl<T, E> Decorate<FutureSupplier<T, E>, T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    /// Builds the decorated operation.
    pub fn decorate(mut self) -> DecoratedFuture<T, E> {
        let stages = self.ordered_stages();
        DecoratedFuture {
            chain: Arc::new(AsyncChain {
                operation: self.operation.0,
                stages,
            }),
            fallback: self.fallback,
        }
    }
}

impl<O, T, E> fmt::Debug for Decorate<O, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorate")
            .field("stages", &self.stages.iter().map(Stage::label).collect::<Vec<_>>())
            .field("preserve_order", &self.preserve_order)
            .field("fallback", &self.fallback.as_ref().map(|fb| fb.name().to_string()))
            .finish()
    }
}

/// Result of an operation cancelled by a runtime shutdown before it resolved.
fn abandoned<E>() -> ResilienceError<E> {
    ResilienceError::Timeout {
        name: "blocking".to_string(),
        timeout: Duration::ZERO,
    }
}

struct SyncChain<T, E> {
    operation: SyncOperation<T, E>,
    stages: Vec<Stage>,
}

impl<T, E> SyncChain<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    /// Runs `stages[..depth]` on the calling thread; `stages[depth - 1]` is outermost.
    fn invoke(self: &Arc<Self>, depth: usize) -> Result<T, ResilienceError<E>> {
        let Some(stage) = depth.checked_sub(1).map(|i| &self.stages[i]) else {
            return (self.operation)();
        };

        match stage {
            Stage::ThreadPoolBulkhead(pool) => {
                let operation = Arc::clone(&self.operation);
                pool.call_sync(move || operation())
            }
            Stage::Bulkhead(bulkhead) => bulkhead.call_sync(|| self.invoke(depth - 1)),
            Stage::RateLimiter(limiter) => limiter.call_sync(|| self.invoke(depth - 1)),
            Stage::CircuitBreaker(breaker) => breaker.call_sync(|| self.invoke(depth - 1)),
            Stage::Retry(retry) => retry.call_sync(|| self.invoke(depth - 1)),
            Stage::TimeLimiter(limiter) => match &self.stages[..depth - 1] {
                // the pool's worker stands in for the helper thread
                [Stage::ThreadPoolBulkhead(pool)] => {
                    let operation = Arc::clone(&self.operation);
                    let task = pool.submit(move || operation())?;
                    limiter.wait_sync(task)
                }
                _ => {
                    let chain = Arc::clone(self);
                    limiter.call_sync(move || chain.invoke(depth - 1))
                }
            },
        }
    }

    /// Runs `stages[..depth]` asynchronously.
    fn invoke_async(
        self: Arc<Self>,
        depth: usize,
    ) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        Box::pin(async move {
            let Some(stage) = depth.checked_sub(1).map(|i| self.stages[i].clone()) else {
                let operation = Arc::clone(&self.operation);
                return match tokio::task::spawn_blocking(move || operation()).await {
                    Ok(result) => result,
                    Err(join) if join.is_panic() => panic::resume_unwind(join.into_panic()),
                    Err(_) => Err(abandoned()),
                };
            };

            let inner = || Arc::clone(&self).invoke_async(depth - 1);
            match stage {
                Stage::ThreadPoolBulkhead(pool) => {
                    let operation = Arc::clone(&self.operation);
                    pool.call(move || operation()).await
                }
                Stage::Bulkhead(bulkhead) => bulkhead.call(inner()).await,
                Stage::RateLimiter(limiter) => limiter.call(inner()).await,
                Stage::TimeLimiter(limiter) => limiter.call(inner()).await,
                Stage::CircuitBreaker(breaker) => breaker.call(inner()).await,
                Stage::Retry(retry) => retry.call(inner).await,
            }
        })
    }
}

struct AsyncChain<T, E> {
    operation: AsyncOperation<T, E>,
    stages: Vec<Stage>,
}

impl<T, E> AsyncChain<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    fn invoke(self: Arc<Self>, depth: usize) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        Box::pin(async move {
            let Some(stage) = depth.checked_sub(1).map(|i| self.stages[i].clone()) else {
                return (self.operation)().await;
            };

            let inner = || Arc::clone(&self).invoke(depth - 1);
            match stage {
                Stage::ThreadPoolBulkhead(pool) => {
                    // the worker drives the future on the caller's runtime
                    let future = (self.operation)();
                    let runtime = tokio::runtime::Handle::try_current().ok();
                    pool.call(move || match runtime {
                        Some(handle) => handle.block_on(future),
                        None => futures::executor::block_on(future),
                    })
                    .await
                }
                Stage::Bulkhead(bulkhead) => bulkhead.call(inner()).await,
                Stage::RateLimiter(limiter) => limiter.call(inner()).await,
                Stage::TimeLimiter(limiter) => limiter.call(inner()).await,
                Stage::CircuitBreaker(breaker) => breaker.call(inner()).await,
                Stage::Retry(retry) => retry.call(inner).await,
            }
        })
    }
}

/// A decorated synchronous operation.
///
/// Cheap to clone; clones share the decorated primitives.
pub struct Decorated<T, E> {
    chain: Arc<SyncChain<T, E>>,
    fallback: Option<Arc<Fallback<T, E>>>,
}

impl<T, E> Decorated<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    /// Runs the operation, blocking the calling thread.
    pub fn invoke(&self) -> Result<T, ResilienceError<E>> {
        let result = self.chain.invoke(self.chain.stages.len());
        match &self.fallback {
            Some(fallback) => fallback.apply_sync(result),
            None => result,
        }
    }

    /// Runs the operation without blocking the caller.
    ///
    /// The operation executes on the thread-pool bulkhead if one is
    /// configured, otherwise on tokio's blocking pool. Must be polled
    /// inside a tokio runtime.
    pub fn invoke_async(&self) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        let chain = Arc::clone(&self.chain);
        let fallback = self.fallback.clone();
        Box::pin(async move {
            let depth = chain.stages.len();
            let result = chain.invoke_async(depth).await;
            match fallback {
                Some(fallback) => fallback.apply(result).await,
                None => result,
            }
        })
    }
}

impl<T, E> Clone for Decorated<T, E> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            fallback: self.fallback.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Decorated<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorated")
            .field("stages", &self.chain.stages.iter().map(Stage::label).collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// A decorated asynchronous operation.
pub struct DecoratedFuture<T, E> {
    chain: Arc<AsyncChain<T, E>>,
    fallback: Option<Arc<Fallback<T, E>>>,
}

impl<T, E> DecoratedFuture<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    /// Runs the operation.
    pub fn invoke_async(&self) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        let chain = Arc::clone(&self.chain);
        let fallback = self.fallback.clone();
        Box::pin(async move {
            let depth = chain.stages.len();
            let result = chain.invoke(depth).await;
            match fallback {
                Some(fallback) => fallback.apply(result).await,
                None => result,
            }
        })
    }
}

impl<T, E> Clone for DecoratedFuture<T, E> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            fallback: self.fallback.clone(),
        }
    }
}

impl<T, E> fmt::Debug for DecoratedFuture<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratedFuture")
            .field("stages", &self.chain.stages.iter().map(Stage::label).collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
