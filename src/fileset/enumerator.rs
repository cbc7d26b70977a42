//! Lazy enumeration of chunk descriptors from a fileset

use super::{Chunk, EntryRange, Fileset};
use crate::error::ResolutionError;
use crate::source::{ColumnarFile, SourceError};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Iterator over the chunks of a fileset.
///
/// Files are opened one at a time, when enumeration reaches them, so a file
/// that cannot be resolved surfaces as an `Err` before any chunk of it is
/// yielded. Order is dataset, then file, then entry range.
pub struct ChunkEnumerator<'a> {
    table: String,
    chunk_size: Option<u64>,
    max_chunks: Option<usize>,
    files: VecDeque<(&'a str, Option<&'a Path>)>,
    pending: VecDeque<Chunk>,
    current_dataset: Option<&'a str>,
    emitted_for_dataset: usize,
    next_index: usize,
    failed: bool,
}

impl<'a> ChunkEnumerator<'a> {
    pub fn new(fileset: &'a Fileset, table: impl Into<String>) -> Self {
        let mut files = VecDeque::with_capacity(fileset.file_count());
        for (dataset, paths) in fileset.datasets() {
            if paths.is_empty() {
                // surfaces as an error when enumeration reaches this dataset
                files.push_back((dataset, None));
            }
            files.extend(paths.iter().map(|p| (dataset, Some(p.as_path()))));
        }

        Self {
            table: table.into(),
            chunk_size: None,
            max_chunks: None,
            files,
            pending: VecDeque::new(),
            current_dataset: None,
            emitted_for_dataset: 0,
            next_index: 0,
            failed: false,
        }
    }

    /// Split files into entry ranges of about `chunk_size` entries
    pub fn with_chunk_size(mut self, chunk_size: Option<u64>) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Stop after `max_chunks` chunks per dataset
    pub fn with_max_chunks(mut self, max_chunks: Option<usize>) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    fn resolve(&self, dataset: &str, path: Option<&Path>) -> Result<u64, ResolutionError> {
        let Some(path) = path else {
            return Err(ResolutionError::EmptyDataset {
                dataset: dataset.to_string(),
            });
        };

        let to_resolution = |err: SourceError| match err {
            SourceError::Io { path, source } => ResolutionError::Open {
                dataset: dataset.to_string(),
                path,
                source,
            },
            SourceError::MissingTable { path, table } => ResolutionError::MissingTable {
                dataset: dataset.to_string(),
                path,
                table,
            },
            other => ResolutionError::Malformed {
                dataset: dataset.to_string(),
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        };

        let file = ColumnarFile::open(path).map_err(to_resolution)?;
        file.num_entries(&self.table).map_err(to_resolution)
    }

    fn dataset_exhausted(&self, dataset: &str) -> bool {
        self.current_dataset == Some(dataset)
            && self
                .max_chunks
                .is_some_and(|max| self.emitted_for_dataset >= max)
    }
}

impl Iterator for ChunkEnumerator<'_> {
    type Item = Result<Chunk, ResolutionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if let Some(mut chunk) = self.pending.pop_front() {
                if self.dataset_exhausted(&chunk.dataset) {
                    self.pending.clear();
                    continue;
                }
                chunk.index = self.next_index;
                self.next_index += 1;
                self.emitted_for_dataset += 1;
                return Some(Ok(chunk));
            }

            let (dataset, path) = self.files.pop_front()?;
            if self.current_dataset != Some(dataset) {
                self.current_dataset = Some(dataset);
                self.emitted_for_dataset = 0;
            }
            if self.dataset_exhausted(dataset) {
                continue;
            }

            let entries = match self.resolve(dataset, path) {
                Ok(entries) => entries,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            };
            let Some(path) = path else {
                continue;
            };
            debug!(
                "Resolved {} ({}) with {} entries in `{}`",
                path.display(),
                dataset,
                entries,
                self.table
            );

            for range in EntryRange::split(entries, self.chunk_size) {
                // indexed when yielded, so truncation leaves no gaps
                self.pending.push_back(Chunk {
                    index: 0,
                    dataset: dataset.to_string(),
                    file: PathBuf::from(path),
                    table: self.table.clone(),
                    range,
                });
            }
        }
    }
}
