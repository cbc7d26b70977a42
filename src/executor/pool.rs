//! Shared work queue and event loop used by the parallel strategies
//!
//! Chunks are queued in enumeration order and pulled by whichever worker is
//! idle. Workers report back over an event channel; the coordinator folds
//! events in arrival order through a [`Collector`].

use super::collector::{Collector, Execution};
use crate::accumulator::Accumulable;
use crate::error::{ChunkFailure, JobFailure};
use crate::fileset::Chunk;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub(crate) struct WorkQueue {
    work_rx: Arc<RwLock<mpsc::Receiver<Chunk>>>,
    cancelled: Arc<AtomicBool>,
}

impl WorkQueue {
    pub async fn fill(chunks: Vec<Chunk>) -> Result<Self, JobFailure> {
        let (work_tx, work_rx) = mpsc::channel::<Chunk>(chunks.len().max(1));
        for chunk in chunks {
            work_tx
                .send(chunk)
                .await
                .map_err(|e| JobFailure::Strategy {
                    strategy: "pool",
                    reason: format!("Failed to send chunk to work queue: {e}"),
                })?;
        }
        drop(work_tx);

        Ok(Self {
            work_rx: Arc::new(RwLock::new(work_rx)),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Next chunk to dispatch; `None` once drained or cancelled
    pub async fn next(&self) -> Option<Chunk> {
        if self.is_cancelled() {
            return None;
        }
        let mut rx = self.work_rx.write().await;
        rx.recv().await
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) enum WorkerEvent<T> {
    Completed { chunk: Chunk, partial: T, bytes: u64 },
    Failed(ChunkFailure),
    /// The worker itself broke down; not attributable to a chunk's content
    Fault { worker: usize, reason: String },
}

pub(crate) type EventSender<T> = mpsc::UnboundedSender<WorkerEvent<T>>;

/// Drive workers to completion and merge their results.
///
/// Every worker owns a clone of the event sender; the loop ends when the
/// last one is dropped. Stops dispatch and aborts in-flight workers on the
/// first unrecovered failure.
pub(crate) async fn coordinate<T: Accumulable>(
    strategy: &'static str,
    total: usize,
    queue: WorkQueue,
    mut events: mpsc::UnboundedReceiver<WorkerEvent<T>>,
    mut workers: JoinSet<()>,
    mut collector: Collector<T>,
) -> Result<Execution<T>, JobFailure> {
    while let Some(event) = events.recv().await {
        let outcome = match event {
            WorkerEvent::Completed {
                chunk,
                partial,
                bytes,
            } => {
                collector.completed(&chunk, partial, bytes);
                Ok(())
            }
            WorkerEvent::Failed(failure) => collector.failed(failure),
            WorkerEvent::Fault { worker, reason } => {
                error!("Worker {} failed: {}", worker, reason);
                collector.abandon("worker fault");
                Err(JobFailure::Strategy {
                    strategy,
                    reason: format!("worker {worker}: {reason}"),
                })
            }
        };

        if let Err(failure) = outcome {
            warn!("Cancelling outstanding chunks: {}", failure);
            queue.cancel();
            workers.abort_all();
            return Err(failure);
        }
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                collector.abandon("worker panicked");
                return Err(JobFailure::Strategy {
                    strategy,
                    reason: format!("worker task panicked: {e}"),
                });
            }
        }
    }

    let reported = collector.reported();
    if reported != total {
        collector.abandon("incomplete");
        return Err(JobFailure::Strategy {
            strategy,
            reason: format!("{} of {} chunks were never reported", total - reported, total),
        });
    }

    debug!("All {} chunks reported by {} workers", total, strategy);
    Ok(collector.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailureMode;
    use crate::fileset::EntryRange;
    use crate::progress::ChunkProgress;
    use std::path::PathBuf;

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|index| Chunk {
                index,
                dataset: "ZJets".to_string(),
                file: PathBuf::from("dy.json"),
                table: "Events".to_string(),
                range: EntryRange::new(0, 1),
            })
            .collect()
    }

    async fn run_pool(
        n: usize,
        workers: usize,
        failure_mode: FailureMode,
        fail_index: Option<usize>,
    ) -> Result<Execution<u64>, JobFailure> {
        let queue = WorkQueue::fill(chunks(n)).await.unwrap();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut set = JoinSet::new();
        for _ in 0..workers {
            let queue = queue.clone();
            let events = events_tx.clone();
            set.spawn(async move {
                while let Some(chunk) = queue.next().await {
                    let event = if Some(chunk.index) == fail_index {
                        WorkerEvent::Failed(ChunkFailure {
                            chunk,
                            reason: "boom".to_string(),
                            attempts: 1,
                        })
                    } else {
                        WorkerEvent::Completed {
                            chunk,
                            partial: 1,
                            bytes: 0,
                        }
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
            });
        }
        drop(events_tx);

        let collector = Collector::new(failure_mode, ChunkProgress::hidden());
        coordinate("test", n, queue, events_rx, set, collector).await
    }

    #[tokio::test]
    async fn test_queue_preserves_dispatch_order() {
        let queue = WorkQueue::fill(chunks(3)).await.unwrap();
        let mut seen = Vec::new();
        while let Some(chunk) = queue.next().await {
            seen.push(chunk.index);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_cancelled_queue_stops_dispatch() {
        let queue = WorkQueue::fill(chunks(3)).await.unwrap();
        assert!(queue.next().await.is_some());
        queue.cancel();
        assert!(queue.next().await.is_none());
    }

    #[tokio::test]
    async fn test_every_chunk_is_merged_once() {
        let execution = run_pool(25, 4, FailureMode::FailFast, None).await.unwrap();
        assert_eq!(execution.accumulated, 25);
        assert_eq!(execution.chunks_processed, 25);
    }

    #[tokio::test]
    async fn test_fail_fast_surfaces_the_failed_chunk() {
        let err = run_pool(10, 3, FailureMode::FailFast, Some(6)).await.unwrap_err();
        match err {
            JobFailure::Chunk(failure) => assert_eq!(failure.chunk.index, 6),
            other => panic!("Expected a chunk failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_best_effort_skips_the_failed_chunk() {
        let execution = run_pool(10, 3, FailureMode::BestEffort, Some(6)).await.unwrap();
        assert_eq!(execution.accumulated, 9);
        assert_eq!(execution.failures.len(), 1);
        assert_eq!(execution.failures[0].chunk.index, 6);
    }

    #[tokio::test]
    async fn test_fault_aborts_the_run() {
        let queue = WorkQueue::fill(chunks(2)).await.unwrap();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<WorkerEvent<u64>>();
        events_tx
            .send(WorkerEvent::Fault {
                worker: 0,
                reason: "exited with status 9".to_string(),
            })
            .unwrap();
        drop(events_tx);

        let collector = Collector::new(FailureMode::BestEffort, ChunkProgress::hidden());
        let err = coordinate("process_parallel", 2, queue.clone(), events_rx, JoinSet::new(), collector)
            .await
            .unwrap_err();
        assert!(matches!(err, JobFailure::Strategy { .. }));
        assert!(queue.is_cancelled());
    }

    #[tokio::test]
    async fn test_missing_reports_are_a_fault() {
        let queue = WorkQueue::fill(chunks(2)).await.unwrap();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<WorkerEvent<u64>>();
        drop(events_tx);

        let collector = Collector::new(FailureMode::FailFast, ChunkProgress::hidden());
        let err = coordinate("thread_parallel", 2, queue, events_rx, JoinSet::new(), collector)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("never reported"));
    }
}
