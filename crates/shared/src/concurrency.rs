//! Concurrency primitives and request-scoped context.
//!
//! The sync pipeline is I/O-bound orchestration: embedding calls fan out
//! through a bounded [`WorkerPool`], and results drain through a
//! [`BoundedQueue`] into the single synchronization lane. Cancellation is
//! best-effort: queued work is dropped once cancelled; in-flight work runs to
//! completion unless it cooperates via [`RequestContext`].

use crate::{ErrorCode, ErrorEnvelope, Result};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, Notify};

/// A correlation identifier used for logging and run summaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Parse a correlation identifier from user input.
    ///
    /// The value is trimmed; empty values are rejected.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlation id must be non-empty",
            ));
        }
        Ok(Self(Arc::<str>::from(trimmed)))
    }

    /// Create a new run id, best-effort unique within this process.
    #[must_use]
    pub fn new_run_id() -> Self {
        let n = RUN_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Arc::<str>::from(format!("run_{n}")))
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

static RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A clonable cancellation token that can be awaited.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Cancel the token and wake all current and future waiters.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::SeqCst);
        if !was_cancelled {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Request-scoped context passed across boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a new context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Convenience constructor: create a context with an auto-generated run id.
    #[must_use]
    pub fn new_run() -> Self {
        Self::new(CorrelationId::new_run_id())
    }

    /// Create a context sharing an existing cancellation token.
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await cancellation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Return a cancellation error when cancelled, including operation metadata.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation));
        }
        Ok(())
    }
}

/// Error returned when a [`BoundedQueue`] is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedQueueClosedError;

impl fmt::Display for BoundedQueueClosedError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("bounded queue is closed")
    }
}

impl std::error::Error for BoundedQueueClosedError {}

impl From<BoundedQueueClosedError> for ErrorEnvelope {
    fn from(_: BoundedQueueClosedError) -> Self {
        Self::expected(
            ErrorCode::new("core", "queue_closed"),
            "bounded queue is closed",
        )
    }
}

/// A bounded async queue with explicit backpressure.
///
/// - `enqueue` waits when the queue is full
/// - `dequeue` waits when the queue is empty
/// - both are cancellation-aware via [`RequestContext`]
///
/// A closed queue retains already-queued items so a draining consumer can
/// finish them; `close_and_clear` drops them instead.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Arc<Mutex<QueueState<T>>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    waiting_consumers: VecDeque<oneshot::Sender<T>>,
    waiting_producers: VecDeque<oneshot::Sender<()>>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Create a new bounded queue.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "queue capacity must be a positive number",
            ));
        }

        Ok(Self {
            capacity,
            state: Arc::new(Mutex::new(QueueState {
                items: VecDeque::new(),
                waiting_consumers: VecDeque::new(),
                waiting_producers: VecDeque::new(),
                closed: false,
            })),
        })
    }

    /// Close the queue, rejecting blocked producers and consumers.
    ///
    /// Items already in the queue are retained and may still be dequeued.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        state.waiting_consumers.clear();
        state.waiting_producers.clear();
    }

    /// Close the queue and drop all queued items.
    ///
    /// Intended for cancellation paths where queued work must not execute.
    pub async fn close_and_clear(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.items.clear();
        state.waiting_consumers.clear();
        state.waiting_producers.clear();
    }

    /// Enqueue an item, waiting for capacity when the queue is full.
    pub async fn enqueue(&self, ctx: &RequestContext, mut item: T) -> Result<()> {
        ctx.ensure_not_cancelled("queue.enqueue")?;

        loop {
            let producer_gate = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(ErrorEnvelope::from(BoundedQueueClosedError));
                }

                // A waiting consumer takes the item directly.
                while let Some(consumer) = state.waiting_consumers.pop_front() {
                    match consumer.send(item) {
                        Ok(()) => return Ok(()),
                        Err(returned) => item = returned,
                    }
                }

                if state.items.len() < self.capacity {
                    state.items.push_back(item);
                    return Ok(());
                }

                let (tx, rx) = oneshot::channel::<()>();
                state.waiting_producers.push_back(tx);
                rx
            };

            tokio::select! {
                () = ctx.cancelled() => {
                    return Err(ErrorEnvelope::cancelled("operation cancelled")
                        .with_metadata("operation", "queue.enqueue"));
                }
                gate = producer_gate => {
                    if gate.is_err() {
                        return Err(ErrorEnvelope::from(BoundedQueueClosedError));
                    }
                }
            }
        }
    }

    /// Dequeue an item, waiting for one when the queue is empty.
    pub async fn dequeue(&self, ctx: &RequestContext) -> Result<T> {
        ctx.ensure_not_cancelled("queue.dequeue")?;

        let consumer_wait = {
            let mut state = self.state.lock().await;

            if let Some(item) = state.items.pop_front() {
                // Let one blocked producer through now that capacity freed up.
                while let Some(producer) = state.waiting_producers.pop_front() {
                    if producer.send(()).is_ok() {
                        break;
                    }
                }
                return Ok(item);
            }

            if state.closed {
                return Err(ErrorEnvelope::from(BoundedQueueClosedError));
            }

            let (tx, rx) = oneshot::channel::<T>();
            state.waiting_consumers.push_back(tx);
            rx
        };

        tokio::select! {
            () = ctx.cancelled() => {
                Err(ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", "queue.dequeue"))
            }
            received = consumer_wait => {
                received.map_err(|_| ErrorEnvelope::from(BoundedQueueClosedError))
            }
        }
    }
}

type BoxedTaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Task = Box<dyn FnOnce() -> BoxedTaskFuture + Send + 'static>;

/// Options for the worker pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolOptions {
    /// Number of worker tasks (bounded concurrency).
    pub concurrency: usize,
    /// Backpressure: maximum queued tasks waiting for workers.
    ///
    /// Default: `concurrency * 2` (minimum 1).
    pub queue_capacity: Option<usize>,
}

/// A bounded worker pool executor.
///
/// - bounded concurrency
/// - bounded queue (backpressure on submit)
/// - best-effort cancellation: queued tasks are dropped when cancelled
pub struct WorkerPool {
    ctx: RequestContext,
    queue: BoundedQueue<Task>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    cancel_watcher: tokio::task::JoinHandle<()>,
}

impl WorkerPool {
    /// Create a new worker pool bound to the provided [`RequestContext`].
    pub fn new(ctx: RequestContext, options: WorkerPoolOptions) -> Result<Self> {
        if options.concurrency == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "concurrency must be a positive number",
            ));
        }

        let capacity = options
            .queue_capacity
            .unwrap_or_else(|| options.concurrency.saturating_mul(2))
            .max(1);
        let queue: BoundedQueue<Task> = BoundedQueue::new(capacity)?;

        let token = ctx.cancellation_token();
        let queue_for_cancel = queue.clone();
        let cancel_watcher = tokio::spawn(async move {
            token.cancelled().await;
            queue_for_cancel.close_and_clear().await;
        });

        let mut workers = Vec::with_capacity(options.concurrency);
        for _ in 0..options.concurrency {
            let queue = queue.clone();
            let ctx = ctx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    if ctx.is_cancelled() {
                        return;
                    }
                    let Ok(task) = queue.dequeue(&ctx).await else {
                        // Closed queue is the normal stop signal.
                        return;
                    };
                    task().await;
                }
            }));
        }

        Ok(Self {
            ctx,
            queue,
            workers,
            cancel_watcher,
        })
    }

    /// Stop the pool by dropping queued work and closing the queue.
    pub async fn stop(&self) {
        self.queue.close_and_clear().await;
    }

    /// Stop the pool and await worker termination.
    pub async fn shutdown(mut self) -> Result<()> {
        self.queue.close_and_clear().await;
        self.cancel_watcher.abort();
        let _ = self.cancel_watcher.await;

        for handle in self.workers.drain(..) {
            handle.await.map_err(|join_error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    format!("worker task failed: {join_error}"),
                    crate::ErrorClass::NonRetriable,
                )
            })?;
        }
        Ok(())
    }

    /// Submit a task to the pool and await its result.
    pub async fn submit<T, Fut, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
    {
        self.ctx.ensure_not_cancelled("worker_pool.submit")?;

        let (tx, rx) = oneshot::channel::<Result<T>>();
        let ctx = self.ctx.clone();
        let wrapped: Task = Box::new(move || {
            Box::pin(async move {
                // Queued work is skipped once cancelled.
                if ctx.is_cancelled() {
                    let _ = tx.send(Err(ErrorEnvelope::cancelled("operation cancelled")));
                    return;
                }
                let _ = tx.send(task().await);
            })
        });

        if let Err(error) = self.queue.enqueue(&self.ctx, wrapped).await {
            if self.ctx.is_cancelled() {
                return Err(ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", "worker_pool.submit"));
            }
            return Err(error);
        }

        rx.await.unwrap_or_else(|_| {
            Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", "worker_pool.submit"))
        })
    }
}
