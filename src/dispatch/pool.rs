//! Dispatch pool.
//!
//! # Responsibilities
//! - Start `min_size` units eagerly and grow lazily up to `max_size`
//! - Tag each job with a fresh request id and route its events back
//! - Track per-unit load with RAII guards
//! - Evict units that exit and fail their in-flight jobs
//!
//! # Design Decisions
//! - The unit table is the only shared state; selection, insertion and
//!   removal happen under one short-lived mutex
//! - A job is registered as pending while the table lock is held, so an
//!   eviction either sees it or the unit was never selectable
//! - No admission control: a saturated pool still assigns immediately
//! - A unit told to exit, or seen exiting, is marked closing at once and is
//!   never selected again, even before its eviction completes

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::config::{MessagesConfig, PoolConfig};
use crate::dispatch::balancer::{IdleFirst, LoadGuard, Selection};
use crate::dispatch::worker::{
    spawn_unit, UnitChannels, UnitContext, WorkerCommand, WorkerId, PANIC_EXIT_CODE,
};
use crate::error::Error;
use crate::middleware::{ChainExecutor, RequestEnvelope};
use crate::observability::metrics;
use crate::protocol::{RequestId, TransferEnvelope, TransferEvent};
use crate::routing::RouteTable;

type EventSender = mpsc::UnboundedSender<Result<TransferEvent, Error>>;

// Field order matters: the load is released before the receiver can observe the close.
#[derive(Debug)]
struct PendingRequest {
    _load: LoadGuard,
    events: EventSender,
}

/// One live unit as seen by the pool.
#[derive(Debug)]
pub struct PoolWorker {
    pub id: WorkerId,
    pub(crate) weight: Arc<AtomicUsize>,
    closing: AtomicBool,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    pending: DashMap<RequestId, PendingRequest>,
}

impl PoolWorker {
    fn new(id: WorkerId, commands: mpsc::UnboundedSender<WorkerCommand>) -> Self {
        Self {
            id,
            weight: Arc::new(AtomicUsize::new(0)),
            closing: AtomicBool::new(false),
            commands,
            pending: DashMap::new(),
        }
    }

    /// Requests currently in flight on this unit.
    pub fn weight(&self) -> usize {
        self.weight.load(Ordering::Acquire)
    }

    /// Exiting or exited; no longer selectable.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn detached(id: WorkerId) -> Self {
        let (commands, _) = mpsc::unbounded_channel();
        Self::new(id, commands)
    }

    fn deliver(&self, envelope: TransferEnvelope) {
        let TransferEnvelope { request_id, event } = envelope;
        if event.is_end() {
            if let Some((_, pending)) = self.pending.remove(&request_id) {
                let _ = pending.events.send(Ok(event));
            }
        } else if let Some(pending) = self.pending.get(&request_id) {
            let _ = pending.events.send(Ok(event));
        } else {
            tracing::warn!(worker = %self.id, request_id = %request_id, "Event for unknown request");
        }
    }

    fn fail_pending(&self, code: i32) {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.events.send(Err(Error::WorkerFailure {
                    worker: self.id,
                    code,
                }));
            }
        }
    }
}

/// Events of one dispatched request, in order.
///
/// Ends after `End` or after a single `Err`.
#[derive(Debug)]
pub struct ResponseStream {
    request_id: RequestId,
    worker: WorkerId,
    events: mpsc::UnboundedReceiver<Result<TransferEvent, Error>>,
}

impl ResponseStream {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub async fn recv(&mut self) -> Option<Result<TransferEvent, Error>> {
        self.events.recv().await
    }
}

impl Stream for ResponseStream {
    type Item = Result<TransferEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

struct PoolInner {
    workers: Mutex<Vec<Arc<PoolWorker>>>,
    strategy: IdleFirst,
    unit: UnitContext,
}

impl PoolInner {
    fn lock_workers(&self) -> MutexGuard<'_, Vec<Arc<PoolWorker>>> {
        self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Bounded set of execution units.
#[derive(Clone)]
pub struct DispatchPool {
    inner: Arc<PoolInner>,
}

impl DispatchPool {
    /// Start the pool. Must be called inside a Tokio runtime.
    pub fn start(
        config: &PoolConfig,
        table: RouteTable,
        executor: ChainExecutor,
        messages: MessagesConfig,
    ) -> Result<Self, Error> {
        let inner = Arc::new(PoolInner {
            workers: Mutex::new(Vec::with_capacity(config.max_size)),
            strategy: IdleFirst::new(config.max_size),
            unit: UnitContext {
                tables: Arc::new(ArcSwap::from_pointee(table)),
                executor,
                messages: Arc::new(messages),
            },
        });

        {
            let mut workers = inner.lock_workers();
            for _ in 0..config.min_size.min(config.max_size) {
                let worker = start_worker(&inner)?;
                workers.push(worker);
            }
            metrics::set_pool_size(workers.len());
        }

        tracing::info!(
            min_size = config.min_size,
            max_size = config.max_size,
            "Dispatch pool started"
        );
        Ok(Self { inner })
    }

    /// Send one request to a unit and return its event stream.
    pub fn dispatch(&self, envelope: RequestEnvelope) -> Result<ResponseStream, Error> {
        let request_id = RequestId::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let worker = {
            let mut workers = self.inner.lock_workers();
            let worker = match self.inner.strategy.select(&workers) {
                Selection::Existing(worker) => worker,
                Selection::Spawn => {
                    let worker = start_worker(&self.inner)?;
                    workers.push(worker.clone());
                    metrics::set_pool_size(workers.len());
                    worker
                }
            };
            worker.pending.insert(
                request_id,
                PendingRequest {
                    _load: LoadGuard::acquire(&worker.weight),
                    events: events_tx,
                },
            );
            worker
        };

        tracing::debug!(
            request_id = %request_id,
            worker = %worker.id,
            method = %envelope.method,
            path = %envelope.path,
            "Dispatching request"
        );

        let job = WorkerCommand::Job {
            request_id,
            envelope,
        };
        if worker.commands.send(job).is_err() {
            if let Some((_, pending)) = worker.pending.remove(&request_id) {
                let _ = pending.events.send(Err(Error::WorkerFailure {
                    worker: worker.id,
                    code: PANIC_EXIT_CODE,
                }));
            }
        }

        Ok(ResponseStream {
            request_id,
            worker: worker.id,
            events: events_rx,
        })
    }

    /// Ask one unit to exit with `code`. Returns false if it is not in the pool.
    pub fn terminate(&self, id: WorkerId, code: i32) -> bool {
        let workers = self.inner.lock_workers();
        match workers.iter().find(|w| w.id == id) {
            Some(worker) if !worker.is_closing() => {
                worker.mark_closing();
                worker.commands.send(WorkerCommand::Exit(code)).is_ok()
            }
            _ => false,
        }
    }

    /// Ask every unit to exit cleanly.
    pub fn shutdown(&self) {
        let workers = self.inner.lock_workers();
        tracing::info!(workers = workers.len(), "Stopping dispatch pool");
        for worker in workers.iter() {
            worker.mark_closing();
            let _ = worker.commands.send(WorkerCommand::Exit(0));
        }
    }

    /// Swap the route table used by every unit for new jobs.
    pub fn reload(&self, table: RouteTable) {
        let routes = table.len();
        self.inner.unit.tables.store(Arc::new(table));
        tracing::info!(routes, "Route table reloaded");
    }

    /// `(unit id, in-flight requests)` for every unit still in the table,
    /// including one that is closing but not yet evicted.
    pub fn stats(&self) -> Vec<(WorkerId, usize)> {
        self.inner
            .lock_workers()
            .iter()
            .map(|w| (w.id, w.weight()))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.inner.lock_workers().len()
    }
}

fn start_worker(inner: &Arc<PoolInner>) -> Result<Arc<PoolWorker>, Error> {
    let id = WorkerId::next();
    let UnitChannels {
        commands,
        events,
        exit,
    } = spawn_unit(id, inner.unit.clone()).map_err(|e| {
        tracing::error!(worker = %id, error = %e, "Failed to start unit");
        Error::Internal(format!("failed to start {}: {}", id, e))
    })?;

    let worker = Arc::new(PoolWorker::new(id, commands));
    tokio::spawn(demux(Arc::downgrade(inner), worker.clone(), events, exit));
    Ok(worker)
}

/// Route a unit's events to their requests until the unit exits.
async fn demux(
    pool: Weak<PoolInner>,
    worker: Arc<PoolWorker>,
    mut events: mpsc::UnboundedReceiver<TransferEnvelope>,
    mut exit: oneshot::Receiver<i32>,
) {
    let code = loop {
        tokio::select! {
            biased;
            Some(envelope) = events.recv() => worker.deliver(envelope),
            code = &mut exit => break code.unwrap_or(PANIC_EXIT_CODE),
        }
    };
    worker.mark_closing();
    while let Ok(envelope) = events.try_recv() {
        worker.deliver(envelope);
    }

    if let Some(pool) = pool.upgrade() {
        let mut workers = pool.lock_workers();
        workers.retain(|w| w.id != worker.id);
        metrics::set_pool_size(workers.len());
    }

    if code == 0 {
        tracing::debug!(worker = %worker.id, "Unit exited");
    } else {
        metrics::record_eviction(code);
        tracing::warn!(
            worker = %worker.id,
            code,
            in_flight = worker.pending.len(),
            "Unit exited abnormally, evicted from pool"
        );
    }
    worker.fail_pending(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::Method;

    use crate::protocol::ResponseMessage;
    use crate::routing::{RouteManifest, RouteModule};

    fn pool(min: usize, max: usize) -> DispatchPool {
        let manifest = RouteManifest::new().route(
            "ok/route.ts",
            RouteModule::new().get(|_ctx| async { Ok(Some(ResponseMessage::text("ok"))) }),
        );
        DispatchPool::start(
            &PoolConfig {
                min_size: min,
                max_size: max,
            },
            RouteTable::build(&manifest).unwrap(),
            ChainExecutor::new(Duration::from_secs(1)),
            MessagesConfig::default(),
        )
        .unwrap()
    }

    async fn drain(mut stream: ResponseStream) -> Vec<Result<TransferEvent, Error>> {
        let mut out = Vec::new();
        while let Some(item) = stream.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_starts_min_units() {
        let pool = pool(2, 4);
        assert_eq!(pool.size(), 2);
        assert!(pool.stats().iter().all(|(_, weight)| *weight == 0));
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_weight_released_after_end() {
        let pool = pool(1, 1);
        let stream = pool.dispatch(RequestEnvelope::new(Method::GET, "/ok")).unwrap();
        let events = drain(stream).await;
        assert!(matches!(events.last(), Some(Ok(TransferEvent::End))));
        assert_eq!(pool.stats()[0].1, 0);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_terminate_unknown_worker() {
        let pool = pool(1, 1);
        assert!(!pool.terminate(WorkerId::from(u64::MAX), 1));
        pool.shutdown();
    }
}
