//! Job driver: validate, enumerate, execute, report

use crate::config::ExecutorArgs;
use crate::error::{ChunkFailure, JobError};
use crate::executor::Strategy;
use crate::fileset::{ChunkEnumerator, Fileset};
use crate::processor::Processor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub job_id: String,
    pub strategy: Strategy,
    pub workers: usize,
    pub chunks_total: usize,
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub entries_processed: u64,
    /// Encoded partial-result bytes received from worker processes
    pub bytes_transferred: u64,
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

/// Result of a successful run.
///
/// `failures` lists every chunk excluded from `result`; it can only be
/// non-empty under the best-effort failure mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput<T> {
    pub result: T,
    pub failures: Vec<ChunkFailure>,
    pub metrics: RunMetrics,
}

impl<T> JobOutput<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run `processor` over every chunk of `table` in `fileset` with `strategy`.
///
/// Options are validated and every chunk is enumerated before anything is
/// dispatched, so configuration and resolution errors never leave partial
/// work behind.
///
/// With [`Strategy::ProcessParallel`] and no `worker_program`, workers are
/// spawned from the current executable with the `worker` argument. A binary
/// embedding this crate must then dispatch that argument to
/// [`serve_stdio`](crate::executor::worker::serve_stdio) with a registry
/// holding `P`.
pub async fn run<P: Processor>(
    fileset: &Fileset,
    table: &str,
    processor: P,
    strategy: Strategy,
    args: &ExecutorArgs,
) -> Result<JobOutput<P::Output>, JobError> {
    args.validate(strategy)?;

    let job_id = format!("job-{}", Uuid::new_v4());
    let started_at = Utc::now();
    let clock = Instant::now();
    info!(
        "Starting {} with processor `{}` on {} datasets ({} executor)",
        job_id,
        P::NAME,
        fileset.len(),
        strategy
    );

    let chunks = ChunkEnumerator::new(fileset, table)
        .with_chunk_size(args.chunk_size)
        .with_max_chunks(args.max_chunks)
        .collect::<Result<Vec<_>, _>>()?;
    let chunks_total = chunks.len();
    info!(
        "Enumerated {} chunks over {} files",
        chunks_total,
        fileset.file_count()
    );
    if chunks_total == 0 {
        warn!("No entries to process in table `{}`", table);
    }

    let processor = Arc::new(processor);
    let plan = args.execution_plan();
    let execution = strategy.execute(processor.clone(), chunks, &plan).await?;
    let result = processor.postprocess(execution.accumulated);

    let metrics = RunMetrics {
        job_id,
        strategy,
        workers: plan.workers,
        chunks_total,
        chunks_processed: execution.chunks_processed,
        chunks_failed: execution.failures.len(),
        entries_processed: execution.entries_processed,
        bytes_transferred: execution.bytes_transferred,
        started_at,
        elapsed: clock.elapsed(),
    };
    debug!("Run metrics: {:?}", metrics);
    info!(
        "Finished {} in {:?}: {} chunks processed, {} failed",
        metrics.job_id, metrics.elapsed, metrics.chunks_processed, metrics.chunks_failed
    );

    Ok(JobOutput {
        result,
        failures: execution.failures,
        metrics,
    })
}
