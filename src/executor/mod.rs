//! Executor strategies
//!
//! Three interchangeable ways to turn a chunk sequence into one accumulated
//! result: [`Strategy::Serial`], [`Strategy::ThreadParallel`] and
//! [`Strategy::ProcessParallel`]. All share one invocation contract and one
//! state machine (`Idle -> Running -> Completed | Failed`), and all merge
//! partial results only on the coordinator.

pub mod codec;
mod collector;
mod pool;
mod process;
pub mod protocol;
mod serial;
mod task;
mod threaded;
pub mod worker;

pub use collector::{Collector, Execution};
pub use process::{ProcessParallelExecutor, WORKER_SUBCOMMAND};
pub use serial::SerialExecutor;
pub use task::{process_chunk, TaskContext};
pub(crate) use task::process_chunk_counted;
pub use threaded::ThreadParallelExecutor;

use crate::config::FailureMode;
use crate::error::JobFailure;
use crate::fileset::Chunk;
use crate::processor::Processor;
use crate::progress::ChunkProgress;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Serial,
    ThreadParallel,
    ProcessParallel,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Serial,
        Strategy::ThreadParallel,
        Strategy::ProcessParallel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Serial => "serial",
            Strategy::ThreadParallel => "thread_parallel",
            Strategy::ProcessParallel => "process_parallel",
        }
    }

    /// Whether partial results cross a process boundary
    pub fn is_out_of_process(&self) -> bool {
        matches!(self, Strategy::ProcessParallel)
    }

    /// Run `chunks` to completion with this strategy.
    pub async fn execute<P: Processor>(
        &self,
        processor: Arc<P>,
        chunks: Vec<Chunk>,
        plan: &ExecutionPlan,
    ) -> Result<Execution<P::Output>, JobFailure> {
        match self {
            Strategy::Serial => run_with(&SerialExecutor, processor, chunks, plan).await,
            Strategy::ThreadParallel => {
                run_with(&ThreadParallelExecutor, processor, chunks, plan).await
            }
            Strategy::ProcessParallel => {
                run_with(&ProcessParallelExecutor, processor, chunks, plan).await
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "serial" => Ok(Strategy::Serial),
            "thread_parallel" => Ok(Strategy::ThreadParallel),
            "process_parallel" => Ok(Strategy::ProcessParallel),
            _ => Err(format!(
                "Unknown executor `{s}` (expected serial, thread_parallel or process_parallel)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Error)]
#[error("Invalid executor state transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ExecutionState,
    pub to: ExecutionState,
}

impl ExecutionState {
    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Idle, Running) | (Running, Completed) | (Running, Failed)
        )
    }

    pub fn transition(self, next: ExecutionState) -> Result<ExecutionState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Failed)
    }
}

/// Validated settings a strategy runs with
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub context: TaskContext,
    pub workers: usize,
    pub failure_mode: FailureMode,
    /// Executable spawned as `<program> worker` by the process-parallel
    /// strategy. `None` spawns the current executable, which must then hand
    /// the `worker` subcommand to [`worker::serve_stdio`].
    pub worker_program: Option<PathBuf>,
    pub status: bool,
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self {
            context: TaskContext::default(),
            workers: 1,
            failure_mode: FailureMode::default(),
            worker_program: None,
            status: false,
        }
    }
}

/// One way of dispatching chunks to workers and collecting their partials
#[async_trait]
pub trait ChunkExecutor: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn execute<P: Processor>(
        &self,
        processor: Arc<P>,
        chunks: Vec<Chunk>,
        plan: &ExecutionPlan,
        collector: Collector<P::Output>,
    ) -> Result<Execution<P::Output>, JobFailure>;
}

async fn run_with<E: ChunkExecutor, P: Processor>(
    executor: &E,
    processor: Arc<P>,
    chunks: Vec<Chunk>,
    plan: &ExecutionPlan,
) -> Result<Execution<P::Output>, JobFailure> {
    let strategy = executor.strategy();
    let invalid = |e: InvalidTransition| JobFailure::Strategy {
        strategy: strategy.name(),
        reason: e.to_string(),
    };

    if plan.context.compression.is_some() && !strategy.is_out_of_process() {
        debug!("Compression is ignored by the {} executor", strategy);
    }
    if plan.workers > 1 && strategy == Strategy::Serial {
        debug!("Worker count {} is ignored by the serial executor", plan.workers);
    }

    let mut state = ExecutionState::Idle;
    let total = chunks.len();
    let collector = Collector::new(plan.failure_mode, ChunkProgress::new(total, plan.status));

    state = state.transition(ExecutionState::Running).map_err(invalid)?;
    info!("{} executor running {} chunks", strategy, total);

    let outcome = if total == 0 {
        Ok(collector.finish())
    } else {
        executor.execute(processor, chunks, plan, collector).await
    };

    match outcome {
        Ok(execution) => {
            state = state.transition(ExecutionState::Completed).map_err(invalid)?;
            info!(
                "{} executor {:?}: {} processed, {} skipped",
                strategy,
                state,
                execution.chunks_processed,
                execution.failures.len()
            );
            Ok(execution)
        }
        Err(failure) => {
            state = state.transition(ExecutionState::Failed).map_err(invalid)?;
            warn!("{} executor {:?}: {}", strategy, state, failure);
            Err(failure)
        }
    }
}
