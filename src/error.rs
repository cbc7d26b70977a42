//! Error taxonomy for chunked job execution
//!
//! Configuration and resolution errors abort a job before any chunk is
//! dispatched. Chunk failures are recoverable under the best-effort failure
//! mode and escalate to a [`JobFailure`] otherwise.

use crate::fileset::Chunk;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error returned by [`crate::run`]
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Failed(#[from] JobFailure),
}

impl JobError {
    /// The chunk responsible for the failure, if a chunk was responsible.
    pub fn chunk(&self) -> Option<&Chunk> {
        match self {
            JobError::Failed(JobFailure::Chunk(failure)) => Some(&failure.chunk),
            _ => None,
        }
    }
}

/// Invalid, unknown or conflicting execution options
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Unknown executor option `{name}`")]
    UnknownOption { name: String },

    #[error("Invalid value {value} for option `{option}`: {reason}")]
    InvalidValue {
        option: String,
        value: String,
        reason: String,
    },

    #[error("Option `{first}` conflicts with `{second}`: {reason}")]
    Conflict {
        first: String,
        second: String,
        reason: String,
    },

    #[error("Executor options must be a table of named values")]
    NotATable,

    #[error("Failed to parse executor options: {0}")]
    Parse(String),

    #[error("Failed to read executor options from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigurationError {
    pub(crate) fn invalid(option: &str, value: impl ToString, reason: &str) -> Self {
        ConfigurationError::InvalidValue {
            option: option.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn conflict(first: &str, second: &str, reason: &str) -> Self {
        ConfigurationError::Conflict {
            first: first.to_string(),
            second: second.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A dataset, file or table could not be located or opened
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Dataset `{dataset}` lists no files")]
    EmptyDataset { dataset: String },

    #[error("Failed to open {path} (dataset `{dataset}`)")]
    Open {
        dataset: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed columnar file {path} (dataset `{dataset}`): {reason}")]
    Malformed {
        dataset: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Table `{table}` not found in {path} (dataset `{dataset}`)")]
    MissingTable {
        dataset: String,
        path: PathBuf,
        table: String,
    },
}

impl ResolutionError {
    pub fn dataset(&self) -> &str {
        match self {
            ResolutionError::EmptyDataset { dataset }
            | ResolutionError::Open { dataset, .. }
            | ResolutionError::Malformed { dataset, .. }
            | ResolutionError::MissingTable { dataset, .. } => dataset,
        }
    }
}

/// Processing of a single chunk failed after all allowed attempts
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Chunk {chunk} failed after {attempts} attempt(s): {reason}")]
pub struct ChunkFailure {
    pub chunk: Chunk,
    pub reason: String,
    pub attempts: u32,
}

/// An unrecovered failure that terminated a run
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("Job aborted: {0}")]
    Chunk(#[source] ChunkFailure),

    #[error("Job aborted: {strategy} executor fault: {reason}")]
    Strategy {
        strategy: &'static str,
        reason: String,
    },
}
