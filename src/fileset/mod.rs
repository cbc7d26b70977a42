//! Dataset sets and chunk enumeration

mod chunk;
mod enumerator;

pub use chunk::{Chunk, EntryRange};
pub use enumerator::ChunkEnumerator;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mapping from dataset name to the files that make it up.
///
/// Datasets iterate in name order and files in listed order, which fixes the
/// enumeration order of chunks for a given fileset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fileset {
    datasets: BTreeMap<String, Vec<PathBuf>>,
}

impl Fileset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a dataset
    pub fn with_dataset<I, P>(mut self, name: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.datasets
            .insert(name.into(), files.into_iter().map(Into::into).collect());
        self
    }

    /// Load a fileset from a JSON object of `{"dataset": ["file", ...]}`
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fileset {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse fileset {}", path.display()))
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.datasets
            .iter()
            .map(|(name, files)| (name.as_str(), files.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.datasets.values().map(Vec::len).sum()
    }
}

impl<S, P> FromIterator<(S, Vec<P>)> for Fileset
where
    S: Into<String>,
    P: Into<PathBuf>,
{
    fn from_iter<T: IntoIterator<Item = (S, Vec<P>)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Fileset::new(), |set, (name, files)| set.with_dataset(name, files))
    }
}
