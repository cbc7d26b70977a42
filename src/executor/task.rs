//! Running a processor over a single chunk

use crate::error::ChunkFailure;
use crate::fileset::Chunk;
use crate::processor::Processor;
use crate::schema::SchemaConfig;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Per-chunk settings every worker needs, whatever the strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskContext {
    pub schema: SchemaConfig,
    /// Extra attempts allowed after a failed one
    pub retries: u32,
    /// zlib level for partial results crossing a process boundary
    pub compression: Option<u32>,
}

/// Decode a chunk and run the processor on it, retrying on failure.
///
/// Errors and panics from decoding or from the processor are both reported
/// as a [`ChunkFailure`] once the attempts are exhausted.
pub fn process_chunk<P: Processor>(
    processor: &P,
    chunk: &Chunk,
    context: &TaskContext,
) -> Result<P::Output, ChunkFailure> {
    process_chunk_counted(processor, chunk, context).map(|(partial, _)| partial)
}

/// Like [`process_chunk`], also returning the attempt that succeeded
pub(crate) fn process_chunk_counted<P: Processor>(
    processor: &P,
    chunk: &Chunk,
    context: &TaskContext,
) -> Result<(P::Output, u32), ChunkFailure> {
    let max_attempts = context.retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match attempt_chunk(processor, chunk, context) {
            Ok(partial) => {
                debug!("Processed chunk {} on attempt {}", chunk, attempt);
                return Ok((partial, attempt));
            }
            Err(reason) if attempt < max_attempts => {
                warn!(
                    "Chunk {} failed on attempt {}/{}: {}",
                    chunk, attempt, max_attempts, reason
                );
            }
            Err(reason) => {
                return Err(ChunkFailure {
                    chunk: chunk.clone(),
                    reason,
                    attempts: attempt,
                });
            }
        }
    }
}

fn attempt_chunk<P: Processor>(
    processor: &P,
    chunk: &Chunk,
    context: &TaskContext,
) -> Result<P::Output, String> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<P::Output> {
        let events = context.schema.decode(chunk)?;
        processor.process(&events)
    }));

    match outcome {
        Ok(Ok(partial)) => Ok(partial),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(format!("processor panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::EntryRange;
    use crate::schema::EventView;
    use serde::{Deserialize, Serialize};
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::NamedTempFile;

    /// Counts entries; fails or panics on demand
    #[derive(Default, Serialize, Deserialize)]
    struct EntryCounter {
        fail_first: u32,
        panic: bool,
        #[serde(skip)]
        calls: AtomicU32,
    }

    impl Processor for EntryCounter {
        const NAME: &'static str = "entry_counter";
        type Output = u64;

        fn process(&self, events: &EventView) -> anyhow::Result<u64> {
            if self.panic {
                panic!("bad event in {}", events.dataset());
            }
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                anyhow::bail!("transient read error");
            }
            Ok(events.len() as u64)
        }
    }

    fn fixture() -> (NamedTempFile, Chunk) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"tables": {"Events": {"branches": {"run": [1, 1, 2, 2]}}}}"#)
            .unwrap();
        let chunk = Chunk {
            index: 0,
            dataset: "Data".to_string(),
            file: file.path().to_path_buf(),
            table: "Events".to_string(),
            range: EntryRange::new(1, 4),
        };
        (file, chunk)
    }

    #[test]
    fn test_process_chunk() {
        let (_file, chunk) = fixture();
        let count = process_chunk(&EntryCounter::default(), &chunk, &TaskContext::default());
        assert_eq!(count.unwrap(), 3);
    }

    #[test]
    fn test_retries_then_success_and_exhaustion() {
        let (_file, chunk) = fixture();

        let flaky = EntryCounter {
            fail_first: 2,
            ..Default::default()
        };
        let context = TaskContext {
            retries: 2,
            ..Default::default()
        };
        assert_eq!(process_chunk_counted(&flaky, &chunk, &context).unwrap(), (3, 3));

        flaky.calls.store(0, Ordering::SeqCst);
        let context = TaskContext {
            retries: 1,
            ..Default::default()
        };
        let failure = process_chunk(&flaky, &chunk, &context).unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.chunk, chunk);
        assert!(failure.reason.contains("transient read error"));
    }

    #[test]
    fn test_panic_becomes_chunk_failure() {
        let (_file, chunk) = fixture();
        let panicking = EntryCounter {
            panic: true,
            ..Default::default()
        };
        let failure = process_chunk(&panicking, &chunk, &TaskContext::default()).unwrap_err();
        assert!(failure.reason.contains("panicked"));
        assert!(failure.reason.contains("bad event in Data"));
    }

    #[test]
    fn test_decode_error_becomes_chunk_failure() {
        let (_file, mut chunk) = fixture();
        chunk.table = "Runs".to_string();
        let failure =
            process_chunk(&EntryCounter::default(), &chunk, &TaskContext::default()).unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert!(failure.reason.contains("Runs"));
    }
}
