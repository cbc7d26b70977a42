//! The processor contract
//!
//! A processor is the user's analysis unit. It is called once per chunk with
//! that chunk's event view and returns a partial result. Processors carry
//! configuration only: everything needed to rebuild one lives in its
//! serialized form, which is how process-parallel workers obtain their copy.

mod muon;
mod registry;

pub use muon::{FrameMuonCutflow, MuonCutflow, MuonOutput};
pub use registry::{ChunkRunner, ProcessorRegistry};

use crate::accumulator::Accumulable;
use crate::schema::EventView;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub trait Processor: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Registry name used to rebuild the processor in a worker process
    const NAME: &'static str;

    type Output: Accumulable + Serialize + DeserializeOwned + Send + 'static;

    fn process(&self, events: &EventView) -> anyhow::Result<Self::Output>;

    /// Applied once to the fully accumulated result
    fn postprocess(&self, accumulated: Self::Output) -> Self::Output {
        accumulated
    }
}
