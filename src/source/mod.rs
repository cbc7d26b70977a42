//! Columnar container reader
//!
//! Files hold named tables; each table is a set of equally long branches.
//! A branch is either flat (one number per entry) or jagged (a list of
//! numbers per entry). The engine only needs two things from a file: the
//! number of entries in a table, and the raw branches for an entry range.

use crate::fileset::EntryRange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid columnar file: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Table `{table}` not found in {path}")]
    MissingTable { path: PathBuf, table: String },

    #[error("Entry range {range} is outside table `{table}` of {path} ({entries} entries)")]
    OutOfRange {
        path: PathBuf,
        table: String,
        range: EntryRange,
        entries: u64,
    },
}

/// One column of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Branch {
    Flat(Vec<f64>),
    Jagged(Vec<Vec<f64>>),
}

impl Branch {
    pub fn len(&self) -> usize {
        match self {
            Branch::Flat(values) => values.len(),
            Branch::Jagged(lists) => lists.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slice(&self, start: usize, stop: usize) -> Branch {
        match self {
            Branch::Flat(values) => Branch::Flat(values[start..stop].to_vec()),
            Branch::Jagged(lists) => Branch::Jagged(lists[start..stop].to_vec()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub branches: BTreeMap<String, Branch>,
}

impl Table {
    fn entries(&self) -> Result<u64, String> {
        let mut lengths = self.branches.iter().map(|(name, b)| (name, b.len()));
        let Some((first_name, first_len)) = lengths.next() else {
            return Ok(0);
        };
        for (name, len) in lengths {
            if len != first_len {
                return Err(format!(
                    "branch `{name}` has {len} entries but `{first_name}` has {first_len}"
                ));
            }
        }
        Ok(first_len as u64)
    }
}

/// Raw branches for one entry range, as handed to a schema adapter
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumns {
    pub entries: usize,
    pub branches: BTreeMap<String, Branch>,
}

#[derive(Debug, Clone, Deserialize)]
struct FileContents {
    tables: BTreeMap<String, Table>,
}

/// An opened columnar file
#[derive(Debug, Clone)]
pub struct ColumnarFile {
    path: PathBuf,
    tables: BTreeMap<String, Table>,
}

impl ColumnarFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let contents: FileContents =
            serde_json::from_slice(&bytes).map_err(|e| SourceError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            path,
            tables: contents.tables,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    fn table(&self, name: &str) -> Result<&Table, SourceError> {
        self.tables
            .get(name)
            .ok_or_else(|| SourceError::MissingTable {
                path: self.path.clone(),
                table: name.to_string(),
            })
    }

    /// Number of entries in `table`; fails if its branches disagree on length.
    pub fn num_entries(&self, table: &str) -> Result<u64, SourceError> {
        self.table(table)?
            .entries()
            .map_err(|reason| SourceError::Malformed {
                path: self.path.clone(),
                reason,
            })
    }

    pub fn read(&self, table: &str, range: EntryRange) -> Result<RawColumns, SourceError> {
        let entries = self.num_entries(table)?;
        if range.start > range.stop || range.stop > entries {
            return Err(SourceError::OutOfRange {
                path: self.path.clone(),
                table: table.to_string(),
                range,
                entries,
            });
        }

        let (start, stop) = (range.start as usize, range.stop as usize);
        let branches = self
            .table(table)?
            .branches
            .iter()
            .map(|(name, branch)| (name.clone(), branch.slice(start, stop)))
            .collect();

        Ok(RawColumns {
            entries: stop - start,
            branches,
        })
    }
}
