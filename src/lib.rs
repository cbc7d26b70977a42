//! # chunkflow
//!
//! Chunked columnar event processing with interchangeable executors.
//!
//! A job maps a user [`Processor`] over every chunk of a set of columnar
//! files and folds the per-chunk partial results into one value. Partial
//! results are [`Accumulable`]: their `combine` is associative and
//! commutative with an identity, so serial, thread-parallel and
//! process-parallel execution all produce the same answer.
//!
//! ## Usage
//!
//! ```bash
//! chunkflow run --fileset fileset.json --tree Events --processor muon_cutflow \
//!     --executor process-parallel --workers 4 --schema nanoaod
//! ```
//!
//! ## Modules
//!
//! - `accumulator` - The accumulable algebra: counters, histograms, nested maps
//! - `config` - Execution options and their validation
//! - `driver` - The `run` entry point and its report
//! - `error` - Configuration, resolution and chunk failure errors
//! - `executor` - Serial, thread-parallel and process-parallel strategies
//! - `fileset` - Datasets, chunk descriptors and chunk enumeration
//! - `processor` - The processor contract, built-in processors and registry
//! - `schema` - Adapters from raw branches to event views
//! - `source` - Reader for the JSON columnar file format
pub mod accumulator;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod fileset;
pub mod processor;
pub mod progress;
pub mod schema;
pub mod source;

pub use accumulator::{Accumulable, Counter, Cutflow, Hist, RegularAxis};
pub use config::{ExecutorArgs, FailureMode};
pub use driver::{run, JobOutput, RunMetrics};
pub use error::{ChunkFailure, ConfigurationError, JobError, JobFailure, ResolutionError};
pub use executor::Strategy;
pub use fileset::{Chunk, EntryRange, Fileset};
pub use processor::{Processor, ProcessorRegistry};
pub use schema::{EventView, SchemaKind};
