//! Execution units.
//!
//! # Responsibilities
//! - Run one OS thread per unit with its own current-thread event loop
//! - Execute each job as a separate task (resolve, chain, handler, emit)
//! - Tag every emitted event with the job's request id
//! - Report the unit's exit code when its loop stops
//!
//! # Design Decisions
//! - Units share nothing with each other except the route table handle
//! - A failing job never stops the unit; only `Exit` or a panic of the
//!   unit thread itself does
//! - A unit thread that dies without reporting counts as exit code 101

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::config::MessagesConfig;
use crate::middleware::{ChainExecutor, RequestEnvelope};
use crate::protocol::{emit_response, RequestId, TransferEnvelope};
use crate::routing::RouteTable;

/// Exit code reported for a unit whose thread panicked.
pub const PANIC_EXIT_CODE: i32 = 101;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an execution unit. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for WorkerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Messages from the pool to a unit.
#[derive(Debug)]
pub enum WorkerCommand {
    Job {
        request_id: RequestId,
        envelope: RequestEnvelope,
    },
    /// Stop the event loop and report `code`.
    Exit(i32),
}

/// What every unit needs to run jobs.
#[derive(Clone)]
pub struct UnitContext {
    pub tables: Arc<ArcSwap<RouteTable>>,
    pub executor: ChainExecutor,
    pub messages: Arc<MessagesConfig>,
}

/// Pool-side ends of a freshly started unit.
pub struct UnitChannels {
    pub commands: mpsc::UnboundedSender<WorkerCommand>,
    pub events: mpsc::UnboundedReceiver<TransferEnvelope>,
    pub exit: oneshot::Receiver<i32>,
}

/// Start a unit thread.
pub fn spawn_unit(id: WorkerId, ctx: UnitContext) -> io::Result<UnitChannels> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = oneshot::channel();

    thread::Builder::new()
        .name(format!("treeroute-{}", id))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(worker = %id, error = %e, "Failed to build unit runtime");
                    let _ = exit_tx.send(1);
                    return;
                }
            };

            let code = runtime.block_on(run_loop(id, command_rx, event_tx, ctx));
            // In-flight jobs are cancelled with the runtime.
            drop(runtime);
            let _ = exit_tx.send(code);
        })?;

    tracing::debug!(worker = %id, "Unit started");
    Ok(UnitChannels {
        commands: command_tx,
        events: event_rx,
        exit: exit_rx,
    })
}

async fn run_loop(
    id: WorkerId,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<TransferEnvelope>,
    ctx: UnitContext,
) -> i32 {
    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Job {
                request_id,
                envelope,
            } => {
                let table = ctx.tables.load_full();
                tokio::spawn(execute(
                    request_id,
                    envelope,
                    table,
                    ctx.executor,
                    ctx.messages.clone(),
                    events.clone(),
                ));
            }
            WorkerCommand::Exit(code) => {
                tracing::debug!(worker = %id, code, "Unit exiting");
                return code;
            }
        }
    }
    0
}

/// Run one job to completion and stream its events back.
pub async fn execute(
    request_id: RequestId,
    envelope: RequestEnvelope,
    table: Arc<RouteTable>,
    executor: ChainExecutor,
    messages: Arc<MessagesConfig>,
    events: mpsc::UnboundedSender<TransferEnvelope>,
) {
    let range = envelope.range_header();
    let method = envelope.method.clone();
    let path = envelope.path.clone();

    let response = match executor.run(&table, envelope).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(
                request_id = %request_id,
                method = %method,
                path = %path,
                error = %e,
                "Request failed"
            );
            e.to_response(&messages)
        }
    };

    emit_response(response, range, |event| {
        let _ = events.send(TransferEnvelope { request_id, event });
    })
    .await;
}
