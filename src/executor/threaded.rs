//! Thread-parallel strategy
//!
//! N async workers share the work queue; each chunk is decoded and processed
//! on tokio's blocking pool so the coordinator stays responsive.

use super::collector::{Collector, Execution};
use super::pool::{coordinate, WorkQueue, WorkerEvent};
use super::{process_chunk, ChunkExecutor, ExecutionPlan, Strategy};
use crate::error::JobFailure;
use crate::fileset::Chunk;
use crate::processor::Processor;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadParallelExecutor;

#[async_trait]
impl ChunkExecutor for ThreadParallelExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::ThreadParallel
    }

    async fn execute<P: Processor>(
        &self,
        processor: Arc<P>,
        chunks: Vec<Chunk>,
        plan: &ExecutionPlan,
        collector: Collector<P::Output>,
    ) -> Result<Execution<P::Output>, JobFailure> {
        let total = chunks.len();
        let max_parallel = plan.workers.min(total);
        let queue = WorkQueue::fill(chunks).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut workers = JoinSet::new();
        for worker in 0..max_parallel {
            let queue = queue.clone();
            let events = events_tx.clone();
            let processor = processor.clone();
            let context = plan.context;

            workers.spawn(async move {
                while let Some(chunk) = queue.next().await {
                    let processor = processor.clone();
                    let outcome = task::spawn_blocking(move || {
                        let result = process_chunk(processor.as_ref(), &chunk, &context);
                        (chunk, result)
                    })
                    .await;

                    let event = match outcome {
                        Ok((chunk, Ok(partial))) => WorkerEvent::Completed {
                            chunk,
                            partial,
                            bytes: 0,
                        },
                        Ok((_, Err(failure))) => WorkerEvent::Failed(failure),
                        Err(e) => WorkerEvent::Fault {
                            worker,
                            reason: format!("blocking task failed: {e}"),
                        },
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                debug!("Thread worker {} finished", worker);
            });
        }
        drop(events_tx);

        coordinate(
            Strategy::ThreadParallel.name(),
            total,
            queue,
            events_rx,
            workers,
            collector,
        )
        .await
    }
}
