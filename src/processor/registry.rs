//! Name-based reconstruction of processors inside worker processes

use super::{FrameMuonCutflow, MuonCutflow, Processor};
use crate::error::ChunkFailure;
use crate::executor::{codec, process_chunk_counted, TaskContext};
use crate::fileset::Chunk;
use serde_json::Value;
use std::collections::BTreeMap;

/// A rebuilt processor bound to its task context. Runs one chunk and
/// returns the encoded partial result.
pub trait ChunkRunner: Send {
    fn run(&self, chunk: &Chunk) -> Result<Vec<u8>, ChunkFailure>;
}

struct TypedRunner<P: Processor> {
    processor: P,
    context: TaskContext,
}

impl<P: Processor> ChunkRunner for TypedRunner<P> {
    fn run(&self, chunk: &Chunk) -> Result<Vec<u8>, ChunkFailure> {
        let (partial, attempts) = process_chunk_counted(&self.processor, chunk, &self.context)?;
        codec::encode(&partial, self.context.compression).map_err(|e| ChunkFailure {
            chunk: chunk.clone(),
            reason: format!("Processed, but failed to encode the partial result: {e}"),
            attempts,
        })
    }
}

type RunnerFactory = fn(Value, TaskContext) -> Result<Box<dyn ChunkRunner>, String>;

fn build_runner<P: Processor>(
    state: Value,
    context: TaskContext,
) -> Result<Box<dyn ChunkRunner>, String> {
    let processor: P = serde_json::from_value(state)
        .map_err(|e| format!("Invalid state for processor `{}`: {e}", P::NAME))?;
    Ok(Box::new(TypedRunner { processor, context }))
}

#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: BTreeMap<&'static str, RunnerFactory>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the processors shipped with this crate
    pub fn builtin() -> Self {
        Self::new()
            .with::<MuonCutflow>()
            .with::<FrameMuonCutflow>()
    }

    pub fn register<P: Processor>(&mut self) -> &mut Self {
        self.factories.insert(P::NAME, build_runner::<P>);
        self
    }

    pub fn with<P: Processor>(mut self) -> Self {
        self.register::<P>();
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn instantiate(
        &self,
        name: &str,
        state: Value,
        context: TaskContext,
    ) -> Result<Box<dyn ChunkRunner>, String> {
        let factory = self.factories.get(name).ok_or_else(|| {
            format!(
                "Unknown processor `{name}` (registered: {})",
                self.names().collect::<Vec<_>>().join(", ")
            )
        })?;
        factory(state, context)
    }
}
