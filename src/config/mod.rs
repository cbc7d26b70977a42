//! Execution configuration
//!
//! [`ExecutorArgs`] holds every option the engine recognizes. It can be
//! built in code, from a loose option map or from a TOML file; in every case
//! it is validated against the chosen strategy before any chunk exists.

use crate::error::ConfigurationError;
use crate::executor::{ExecutionPlan, Strategy, TaskContext};
use crate::schema::{SchemaConfig, SchemaKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Option names accepted in option maps and TOML files
pub const KNOWN_OPTIONS: &[&str] = &[
    "workers",
    "worker_count",
    "compression",
    "schema",
    "flatten",
    "chunk_size",
    "chunksize",
    "max_chunks",
    "maxchunks",
    "failure_mode",
    "retries",
    "status",
    "worker_program",
];

const ALIASES: &[(&str, &str)] = &[
    ("workers", "worker_count"),
    ("chunk_size", "chunksize"),
    ("max_chunks", "maxchunks"),
];

/// What happens to the run when a chunk fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Abort on the first failed chunk
    #[default]
    FailFast,
    /// Exclude failed chunks from the result and report them
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorArgs {
    #[serde(alias = "worker_count")]
    pub workers: usize,
    /// zlib level (0-9) for partial results sent back by worker processes
    pub compression: Option<u32>,
    pub schema: Option<SchemaKind>,
    /// Concatenate jagged branches in the base frame view
    pub flatten: bool,
    #[serde(alias = "chunksize")]
    pub chunk_size: Option<u64>,
    /// Cap on chunks per dataset, for quick partial runs
    #[serde(alias = "maxchunks")]
    pub max_chunks: Option<usize>,
    pub failure_mode: FailureMode,
    pub retries: u32,
    /// Show a progress bar on stderr
    pub status: bool,
    /// Worker executable for process-parallel runs; defaults to the running
    /// binary, which must serve the `worker` subcommand
    pub worker_program: Option<PathBuf>,
}

impl Default for ExecutorArgs {
    fn default() -> Self {
        Self {
            workers: 1,
            compression: None,
            schema: None,
            flatten: false,
            chunk_size: None,
            max_chunks: None,
            failure_mode: FailureMode::FailFast,
            retries: 0,
            status: false,
            worker_program: None,
        }
    }
}

impl ExecutorArgs {
    /// Build from a map of named options, e.g. `{"workers": 4, "schema": "nanoaod"}`.
    pub fn from_options(options: Value) -> Result<Self, ConfigurationError> {
        let Value::Object(map) = &options else {
            return Err(ConfigurationError::NotATable);
        };

        if let Some(name) = map.keys().find(|name| !KNOWN_OPTIONS.contains(&name.as_str())) {
            return Err(ConfigurationError::UnknownOption { name: name.clone() });
        }
        for (name, alias) in ALIASES {
            if map.contains_key(*name) && map.contains_key(*alias) {
                return Err(ConfigurationError::conflict(
                    name,
                    alias,
                    "the same option was given twice",
                ));
            }
        }

        serde_json::from_value(options).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        let options =
            serde_json::to_value(table).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        Self::from_options(options)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded executor options from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Reject values and combinations that cannot run under `strategy`.
    pub fn validate(&self, strategy: Strategy) -> Result<(), ConfigurationError> {
        if self.workers == 0 {
            return Err(ConfigurationError::invalid(
                "workers",
                self.workers,
                "at least one worker is required",
            ));
        }
        if let Some(level) = self.compression {
            if level > crate::executor::codec::MAX_COMPRESSION_LEVEL {
                return Err(ConfigurationError::invalid(
                    "compression",
                    level,
                    "zlib levels range from 0 to 9",
                ));
            }
        }
        if self.chunk_size == Some(0) {
            return Err(ConfigurationError::invalid(
                "chunk_size",
                0,
                "chunks must hold at least one entry",
            ));
        }
        if self.max_chunks == Some(0) {
            return Err(ConfigurationError::invalid(
                "max_chunks",
                0,
                "would leave nothing to process",
            ));
        }
        if self.flatten && self.schema == Some(SchemaKind::NanoAod) {
            return Err(ConfigurationError::conflict(
                "flatten",
                "schema",
                "flattening only applies to the base frame view",
            ));
        }
        if self.worker_program.is_some() && strategy != Strategy::ProcessParallel {
            return Err(ConfigurationError::conflict(
                "worker_program",
                "executor",
                &format!("{strategy} does not start worker processes"),
            ));
        }
        Ok(())
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_compression(mut self, compression: Option<u32>) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_schema(mut self, schema: SchemaKind) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: Option<u64>) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_chunks(mut self, max_chunks: Option<usize>) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_status(mut self, status: bool) -> Self {
        self.status = status;
        self
    }

    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    pub fn schema_config(&self) -> SchemaConfig {
        SchemaConfig {
            kind: self.schema.unwrap_or_default(),
            flatten: self.flatten,
        }
    }

    pub fn task_context(&self) -> TaskContext {
        TaskContext {
            schema: self.schema_config(),
            retries: self.retries,
            compression: self.compression,
        }
    }

    pub fn execution_plan(&self) -> ExecutionPlan {
        ExecutionPlan {
            context: self.task_context(),
            workers: self.workers,
            failure_mode: self.failure_mode,
            worker_program: self.worker_program.clone(),
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests;
