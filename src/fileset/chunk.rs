//! Chunk descriptors: the unit of work handed to a worker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Half-open range of entries `[start, stop)` within one table of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryRange {
    pub start: u64,
    pub stop: u64,
}

impl EntryRange {
    pub fn new(start: u64, stop: u64) -> Self {
        debug_assert!(start <= stop, "inverted entry range {start}..{stop}");
        Self { start, stop }
    }

    pub fn len(&self) -> u64 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Split `[0, total)` into contiguous ranges of roughly `chunk_size` entries.
    ///
    /// The file is cut into `max(round(total / chunk_size), 1)` pieces of equal
    /// length (the last one possibly shorter), so a file slightly larger than
    /// the chunk size does not produce a tiny trailing chunk. With no chunk
    /// size the whole file is one range. Zero-entry files produce no ranges.
    pub fn split(total: u64, chunk_size: Option<u64>) -> Vec<EntryRange> {
        if total == 0 {
            return Vec::new();
        }
        let Some(chunk_size) = chunk_size.filter(|size| *size > 0) else {
            return vec![EntryRange::new(0, total)];
        };

        let pieces = ((total as f64 / chunk_size as f64).round() as u64).max(1);
        let step = total.div_ceil(pieces);

        let mut ranges = Vec::with_capacity(pieces as usize);
        let mut start = 0;
        while start < total {
            let stop = (start + step).min(total);
            ranges.push(EntryRange::new(start, stop));
            start = stop;
        }
        ranges
    }
}

impl fmt::Display for EntryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.stop)
    }
}

/// Immutable description of one chunk of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in enumeration order, unique within a job.
    pub index: usize,
    pub dataset: String,
    pub file: PathBuf,
    pub table: String,
    pub range: EntryRange,
}

impl Chunk {
    pub fn entries(&self) -> u64 {
        self.range.len()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}:{}[{}]",
            self.index,
            self.dataset,
            self.file.display(),
            self.range
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(total: u64, ranges: &[EntryRange]) {
        let mut expected_start = 0;
        for range in ranges {
            assert_eq!(range.start, expected_start, "gap or overlap in {ranges:?}");
            assert!(!range.is_empty());
            expected_start = range.stop;
        }
        assert_eq!(expected_start, total);
    }

    #[test]
    fn test_whole_file_without_chunk_size() {
        assert_eq!(EntryRange::split(40, None), vec![EntryRange::new(0, 40)]);
    }

    #[test]
    fn test_empty_file_has_no_ranges() {
        assert!(EntryRange::split(0, None).is_empty());
        assert!(EntryRange::split(0, Some(10)).is_empty());
    }

    #[test]
    fn test_even_split() {
        let ranges = EntryRange::split(100, Some(25));
        assert_eq!(ranges.len(), 4);
        assert!(ranges.iter().all(|r| r.len() == 25));
        assert_partition(100, &ranges);
    }

    #[test]
    fn test_split_avoids_tiny_tail() {
        // 105 / 50 rounds to 2 pieces of 53 and 52
        let ranges = EntryRange::split(105, Some(50));
        assert_eq!(ranges, vec![EntryRange::new(0, 53), EntryRange::new(53, 105)]);
    }

    #[test]
    fn test_chunk_size_larger_than_file() {
        assert_eq!(EntryRange::split(7, Some(1000)), vec![EntryRange::new(0, 7)]);
    }

    #[test]
    fn test_partition_is_complete_for_many_sizes() {
        for total in 1..120 {
            for size in 1..40 {
                assert_partition(total, &EntryRange::split(total, Some(size)));
            }
        }
    }

    #[test]
    fn test_chunk_display() {
        let chunk = Chunk {
            index: 3,
            dataset: "ZJets".to_string(),
            file: PathBuf::from("/data/dy.json"),
            table: "Events".to_string(),
            range: EntryRange::new(10, 20),
        };
        assert_eq!(chunk.to_string(), "#3 ZJets:/data/dy.json[10..20]");
        assert_eq!(chunk.entries(), 10);
    }
}
