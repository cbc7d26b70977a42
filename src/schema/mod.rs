//! Schema adapters: raw branches to a structured per-event view
//!
//! The engine never looks inside an [`EventView`]; it decodes a chunk with the
//! configured adapter and hands the view to the processor.

mod frame;
mod nanoaod;

pub use frame::{BaseSchema, Column, DataFrame};
pub use nanoaod::{Collection, NanoAodSchema, NanoEvents};

use crate::fileset::{Chunk, EntryRange};
use crate::source::{ColumnarFile, RawColumns, SourceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Branch `{branch}` not found")]
    MissingBranch { branch: String },

    #[error("Collection `{collection}` not found")]
    MissingCollection { collection: String },

    #[error("Field `{field}` not found in collection `{collection}`")]
    MissingField { collection: String, field: String },

    #[error("Counter `{counter}` disagrees with `{branch}` at entry {entry}: {expected} vs {actual}")]
    CountMismatch {
        counter: String,
        branch: String,
        entry: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Counter `{counter}` holds {value} at entry {entry}, not a count")]
    InvalidCount {
        counter: String,
        entry: usize,
        value: f64,
    },

    #[error("Entry {entry} is out of range for collection `{collection}` with {entries} entries")]
    EntryOutOfRange {
        collection: String,
        entry: usize,
        entries: usize,
    },

    #[error("Jagged branch `{branch}` does not belong to a collection")]
    UnsupportedBranch { branch: String },

    #[error("Events were decoded with the {actual} schema, not {expected}")]
    WrongLayout {
        expected: SchemaKind,
        actual: SchemaKind,
    },
}

/// Failure to turn a chunk into an event view
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Which adapter interprets the raw branches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    /// Flat frame of raw branches
    #[default]
    Base,
    /// Branches grouped into jagged collections by their `X_` prefix
    #[serde(alias = "nanoevents")]
    NanoAod,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaKind::Base => write!(f, "base"),
            SchemaKind::NanoAod => write!(f, "nanoaod"),
        }
    }
}

impl FromStr for SchemaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(SchemaKind::Base),
            "nanoaod" | "nanoevents" => Ok(SchemaKind::NanoAod),
            other => Err(format!("unknown schema `{other}` (expected base or nanoaod)")),
        }
    }
}

/// Where a view's entries came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub dataset: String,
    pub file: PathBuf,
    pub table: String,
    pub range: EntryRange,
}

impl From<&Chunk> for ChunkMetadata {
    fn from(chunk: &Chunk) -> Self {
        Self {
            dataset: chunk.dataset.clone(),
            file: chunk.file.clone(),
            table: chunk.table.clone(),
            range: chunk.range,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Layout {
    Frame(DataFrame),
    Collections(NanoEvents),
}

/// Structured records for one chunk
#[derive(Debug, Clone)]
pub struct EventView {
    metadata: ChunkMetadata,
    entries: usize,
    layout: Layout,
}

impl EventView {
    pub fn new(metadata: ChunkMetadata, entries: usize, layout: Layout) -> Self {
        Self {
            metadata,
            entries,
            layout,
        }
    }

    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }

    pub fn dataset(&self) -> &str {
        &self.metadata.dataset
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn kind(&self) -> SchemaKind {
        match self.layout {
            Layout::Frame(_) => SchemaKind::Base,
            Layout::Collections(_) => SchemaKind::NanoAod,
        }
    }

    pub fn frame(&self) -> Result<&DataFrame, SchemaError> {
        match &self.layout {
            Layout::Frame(frame) => Ok(frame),
            Layout::Collections(_) => Err(SchemaError::WrongLayout {
                expected: SchemaKind::Base,
                actual: SchemaKind::NanoAod,
            }),
        }
    }

    pub fn events(&self) -> Result<&NanoEvents, SchemaError> {
        match &self.layout {
            Layout::Collections(events) => Ok(events),
            Layout::Frame(_) => Err(SchemaError::WrongLayout {
                expected: SchemaKind::NanoAod,
                actual: SchemaKind::Base,
            }),
        }
    }
}

/// Builds a structured view from raw branches
pub trait SchemaAdapter {
    fn build(&self, raw: RawColumns, metadata: ChunkMetadata) -> Result<EventView, SchemaError>;
}

/// Adapter selection as carried by the execution configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub kind: SchemaKind,
    /// Flatten jagged branches of the base frame into their contents
    pub flatten: bool,
}

impl SchemaConfig {
    pub fn adapter(&self) -> Box<dyn SchemaAdapter> {
        match self.kind {
            SchemaKind::Base => Box::new(BaseSchema {
                flatten: self.flatten,
            }),
            SchemaKind::NanoAod => Box::new(NanoAodSchema),
        }
    }

    /// Read the chunk's entry range and build its event view
    pub fn decode(&self, chunk: &Chunk) -> Result<EventView, DecodeError> {
        let file = ColumnarFile::open(&chunk.file)?;
        let raw = file.read(&chunk.table, chunk.range)?;
        Ok(self.adapter().build(raw, ChunkMetadata::from(chunk))?)
    }
}
