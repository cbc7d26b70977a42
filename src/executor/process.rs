//! Process-parallel strategy
//!
//! Spawns N long-lived `chunkflow worker` processes. Each one is set up once
//! with the processor's registry name and serialized state, then fed chunks
//! from the shared queue. Partial results come back encoded (and optionally
//! compressed), one per chunk.

use super::codec;
use super::collector::{Collector, Execution};
use super::pool::{coordinate, EventSender, WorkQueue, WorkerEvent};
use super::protocol::{read_frame_async, read_message_async, write_message_async, Reply, Request};
use super::{ChunkExecutor, ExecutionPlan, Strategy};
use crate::error::JobFailure;
use crate::fileset::Chunk;
use crate::processor::Processor;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Subcommand the worker program is invoked with
pub const WORKER_SUBCOMMAND: &str = "worker";

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessParallelExecutor;

fn fault(reason: String) -> JobFailure {
    JobFailure::Strategy {
        strategy: Strategy::ProcessParallel.name(),
        reason,
    }
}

/// The worker program: the configured one, else this executable.
///
/// The fallback only works for binaries that route the `worker` argument to
/// [`serve_stdio`](super::worker::serve_stdio), as `chunkflow` itself does.
fn worker_program(plan: &ExecutionPlan) -> Result<PathBuf, JobFailure> {
    match &plan.worker_program {
        Some(program) => Ok(program.clone()),
        None => std::env::current_exe()
            .map_err(|e| fault(format!("Cannot locate the worker executable: {e}"))),
    }
}

#[async_trait]
impl ChunkExecutor for ProcessParallelExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::ProcessParallel
    }

    async fn execute<P: Processor>(
        &self,
        processor: Arc<P>,
        chunks: Vec<Chunk>,
        plan: &ExecutionPlan,
        collector: Collector<P::Output>,
    ) -> Result<Execution<P::Output>, JobFailure> {
        let program = worker_program(plan)?;
        let state = serde_json::to_value(processor.as_ref())
            .map_err(|e| fault(format!("Failed to serialize processor `{}`: {e}", P::NAME)))?;
        let setup = Arc::new(Request::Setup {
            processor: P::NAME.to_string(),
            state,
            context: plan.context,
        });

        let total = chunks.len();
        let max_parallel = plan.workers.min(total);
        let queue = WorkQueue::fill(chunks).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(
            "Starting {} worker processes ({})",
            max_parallel,
            program.display()
        );

        let mut workers = JoinSet::new();
        for worker in 0..max_parallel {
            let queue = queue.clone();
            let events = events_tx.clone();
            let program = program.clone();
            let setup = setup.clone();

            workers.spawn(async move {
                if let Err(e) = drive_worker(worker, &program, &setup, &queue, &events).await {
                    let _ = events.send(WorkerEvent::Fault {
                        worker,
                        reason: format!("{e:#}"),
                    });
                }
            });
        }
        drop(events_tx);

        coordinate(
            Strategy::ProcessParallel.name(),
            total,
            queue,
            events_rx,
            workers,
            collector,
        )
        .await
    }
}

/// Run one worker process until the queue drains.
///
/// Chunk-level failures are forwarded as events; any error returned from
/// here is a fault of the worker itself.
async fn drive_worker<T: DeserializeOwned>(
    worker: usize,
    program: &Path,
    setup: &Request,
    queue: &WorkQueue,
    events: &EventSender<T>,
) -> Result<()> {
    let mut child = Command::new(program)
        .arg(WORKER_SUBCOMMAND)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn worker {}", program.display()))?;
    debug!("Spawned worker {} (pid {:?})", worker, child.id());

    let mut stdin = child.stdin.take().context("Worker stdin was not captured")?;
    let stdout = child.stdout.take().context("Worker stdout was not captured")?;
    let mut stdout = BufReader::new(stdout);

    let handshake = || {
        format!(
            "{} did not answer the worker handshake (it must dispatch `{}` to `serve_stdio`)",
            program.display(),
            WORKER_SUBCOMMAND
        )
    };
    write_message_async(&mut stdin, setup)
        .await
        .with_context(handshake)?;
    match read_message_async::<_, Reply>(&mut stdout)
        .await
        .with_context(handshake)?
    {
        Reply::Ready => {}
        Reply::Rejected { reason } => bail!("setup rejected: {reason}"),
        other => bail!("unexpected reply to setup: {other:?}"),
    }

    while let Some(chunk) = queue.next().await {
        let index = chunk.index;
        write_message_async(&mut stdin, &Request::Process { chunk: chunk.clone() }).await?;

        let event = match read_message_async::<_, Reply>(&mut stdout)
            .await
            .with_context(|| format!("Worker lost while processing chunk {chunk}"))?
        {
            Reply::Completed { index: done, .. } if done == index => {
                let payload = read_frame_async(&mut stdout).await?;
                let partial = codec::decode::<T>(&payload)
                    .with_context(|| format!("Undecodable partial result for chunk {chunk}"))?;
                WorkerEvent::Completed {
                    chunk,
                    partial,
                    bytes: payload.len() as u64,
                }
            }
            Reply::Failed { failure } => WorkerEvent::Failed(failure),
            other => bail!("unexpected reply to chunk {index}: {other:?}"),
        };

        if events.send(event).is_err() {
            break;
        }
    }

    write_message_async(&mut stdin, &Request::Shutdown).await?;
    drop(stdin);
    let status = child.wait().await?;
    if !status.success() {
        bail!("worker exited with {status}");
    }
    debug!("Worker {} exited cleanly", worker);
    Ok(())
}
