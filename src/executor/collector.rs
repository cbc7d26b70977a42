//! Single-threaded merge of partial results on the coordinator

use crate::accumulator::Accumulable;
use crate::config::FailureMode;
use crate::error::{ChunkFailure, JobFailure};
use crate::fileset::Chunk;
use crate::progress::ChunkProgress;
use std::mem;
use tracing::{debug, warn};

/// What a strategy hands back to the driver
#[derive(Debug, Clone, PartialEq)]
pub struct Execution<T> {
    pub accumulated: T,
    /// Chunks excluded from `accumulated`, in enumeration order
    pub failures: Vec<ChunkFailure>,
    pub chunks_processed: usize,
    pub entries_processed: u64,
    /// Encoded partial-result bytes received from worker processes
    pub bytes_transferred: u64,
}

/// Folds partial results as they arrive, in whatever order they arrive.
pub struct Collector<T> {
    failure_mode: FailureMode,
    accumulated: T,
    failures: Vec<ChunkFailure>,
    chunks_processed: usize,
    entries_processed: u64,
    bytes_transferred: u64,
    progress: ChunkProgress,
}

impl<T: Accumulable> Collector<T> {
    pub fn new(failure_mode: FailureMode, progress: ChunkProgress) -> Self {
        Self {
            failure_mode,
            accumulated: T::identity(),
            failures: Vec::new(),
            chunks_processed: 0,
            entries_processed: 0,
            bytes_transferred: 0,
            progress,
        }
    }

    pub fn completed(&mut self, chunk: &Chunk, partial: T, bytes: u64) {
        let accumulated = mem::replace(&mut self.accumulated, T::identity());
        self.accumulated = accumulated.combine(partial);
        self.chunks_processed += 1;
        self.entries_processed += chunk.entries();
        self.bytes_transferred += bytes;
        self.progress.advance(&chunk.dataset);
        debug!("Merged partial result of chunk {}", chunk);
    }

    /// Record a failed chunk. Under fail-fast this ends the run.
    pub fn failed(&mut self, failure: ChunkFailure) -> Result<(), JobFailure> {
        match self.failure_mode {
            FailureMode::FailFast => {
                self.progress.abandon("failed");
                Err(JobFailure::Chunk(failure))
            }
            FailureMode::BestEffort => {
                warn!("Skipping {}", failure);
                self.progress.advance(&failure.chunk.dataset);
                self.failures.push(failure);
                Ok(())
            }
        }
    }

    /// Chunks accounted for so far, successful or not
    pub fn reported(&self) -> usize {
        self.chunks_processed + self.failures.len()
    }

    pub fn abandon(&self, message: &str) {
        self.progress.abandon(message);
    }

    pub fn finish(mut self) -> Execution<T> {
        self.failures.sort_by_key(|failure| failure.chunk.index);
        self.progress.finish("done");
        Execution {
            accumulated: self.accumulated,
            failures: self.failures,
            chunks_processed: self.chunks_processed,
            entries_processed: self.entries_processed,
            bytes_transferred: self.bytes_transferred,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::EntryRange;
    use std::path::PathBuf;

    fn chunk(index: usize, entries: u64) -> Chunk {
        Chunk {
            index,
            dataset: "Data".to_string(),
            file: PathBuf::from("dimuon.json"),
            table: "Events".to_string(),
            range: EntryRange::new(0, entries),
        }
    }

    fn failure(index: usize) -> ChunkFailure {
        ChunkFailure {
            chunk: chunk(index, 10),
            reason: "bad muon".to_string(),
            attempts: 1,
        }
    }

    #[test]
    fn test_merges_in_arrival_order() {
        let mut collector = Collector::<u64>::new(FailureMode::FailFast, ChunkProgress::hidden());
        collector.completed(&chunk(2, 5), 7, 0);
        collector.completed(&chunk(0, 10), 3, 12);
        assert_eq!(collector.reported(), 2);

        let execution = collector.finish();
        assert_eq!(execution.accumulated, 10);
        assert_eq!(execution.chunks_processed, 2);
        assert_eq!(execution.entries_processed, 15);
        assert_eq!(execution.bytes_transferred, 12);
        assert!(execution.failures.is_empty());
    }

    #[test]
    fn test_fail_fast_escalates_first_failure() {
        let mut collector = Collector::<u64>::new(FailureMode::FailFast, ChunkProgress::hidden());
        collector.completed(&chunk(0, 10), 3, 0);
        match collector.failed(failure(1)) {
            Err(JobFailure::Chunk(failure)) => assert_eq!(failure.chunk.index, 1),
            other => panic!("Expected a chunk failure, got {other:?}"),
        }
    }

    #[test]
    fn test_best_effort_records_failures_sorted() {
        let mut collector = Collector::<u64>::new(FailureMode::BestEffort, ChunkProgress::hidden());
        collector.failed(failure(4)).unwrap();
        collector.completed(&chunk(0, 10), 3, 0);
        collector.failed(failure(1)).unwrap();
        assert_eq!(collector.reported(), 3);

        let execution = collector.finish();
        assert_eq!(execution.accumulated, 3);
        let indices: Vec<_> = execution.failures.iter().map(|f| f.chunk.index).collect();
        assert_eq!(indices, vec![1, 4]);
    }
}
