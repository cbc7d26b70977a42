//! Serial strategy: one thread of control, enumeration-order merge

use super::collector::{Collector, Execution};
use super::{process_chunk, ChunkExecutor, ExecutionPlan, Strategy};
use crate::error::JobFailure;
use crate::fileset::Chunk;
use crate::processor::Processor;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

#[async_trait]
impl ChunkExecutor for SerialExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::Serial
    }

    async fn execute<P: Processor>(
        &self,
        processor: Arc<P>,
        chunks: Vec<Chunk>,
        plan: &ExecutionPlan,
        mut collector: Collector<P::Output>,
    ) -> Result<Execution<P::Output>, JobFailure> {
        for chunk in chunks {
            match process_chunk(processor.as_ref(), &chunk, &plan.context) {
                Ok(partial) => collector.completed(&chunk, partial, 0),
                Err(failure) => collector.failed(failure)?,
            }
        }
        Ok(collector.finish())
    }
}
