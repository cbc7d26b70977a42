//! Sparse categorical histograms over a regular axis

use super::{Accumulable, Counter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Largest bin count that leaves room for the overflow and NaN bins
pub const MAX_BINS: u32 = u32::MAX - 2;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AxisError {
    #[error("Axis needs between 1 and {max} bins, got {bins}", max = MAX_BINS)]
    Bins { bins: u32 },
    #[error("Axis range [{low}, {high}) must be finite and increasing")]
    Range { low: f64, high: f64 },
}

/// Regular binning of `[low, high)` into `bins` equal-width bins.
///
/// Bin indices: `0` is underflow, `1..=bins` are the regular bins,
/// `bins + 1` is overflow and `bins + 2` collects NaN. Deserialized axes
/// are checked, so a processor configured with a broken axis is rejected
/// before any chunk runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AxisSpec")]
pub struct RegularAxis {
    bins: u32,
    low: f64,
    high: f64,
}

#[derive(Deserialize)]
struct AxisSpec {
    bins: u32,
    low: f64,
    high: f64,
}

impl TryFrom<AxisSpec> for RegularAxis {
    type Error = AxisError;

    fn try_from(spec: AxisSpec) -> Result<Self, AxisError> {
        Self::try_new(spec.bins, spec.low, spec.high)
    }
}

impl RegularAxis {
    /// Unchecked constructor for axes known to be valid
    pub(crate) const fn new(bins: u32, low: f64, high: f64) -> Self {
        Self { bins, low, high }
    }

    pub fn try_new(bins: u32, low: f64, high: f64) -> Result<Self, AxisError> {
        if bins == 0 || bins > MAX_BINS {
            return Err(AxisError::Bins { bins });
        }
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(AxisError::Range { low, high });
        }
        Ok(Self { bins, low, high })
    }

    pub fn bins(&self) -> u32 {
        self.bins
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn index(&self, value: f64) -> u32 {
        if value.is_nan() {
            return self.bins + 2;
        }
        if value < self.low {
            return 0;
        }
        if value >= self.high {
            return self.bins + 1;
        }
        let fraction = (value - self.low) / (self.high - self.low);
        let bin = (fraction * self.bins as f64) as u32;
        bin.min(self.bins - 1) + 1
    }

    /// Lower edge of regular bin `index` (1-based)
    pub fn lower_edge(&self, index: u32) -> f64 {
        let width = (self.high - self.low) / self.bins as f64;
        self.low + width * (index.saturating_sub(1)) as f64
    }
}

/// Counts per category and bin. Binning lives with whoever fills the
/// histogram, so the empty histogram is a valid identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hist {
    categories: BTreeMap<String, Counter<u32>>,
}

impl Hist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill(&mut self, axis: &RegularAxis, category: &str, value: f64) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .add(axis.index(value), 1);
    }

    pub fn fill_many<I>(&mut self, axis: &RegularAxis, category: &str, values: I)
    where
        I: IntoIterator<Item = f64>,
    {
        let counts = self.categories.entry(category.to_string()).or_default();
        for value in values {
            counts.add(axis.index(value), 1);
        }
    }

    pub fn count(&self, category: &str, bin: u32) -> u64 {
        self.categories
            .get(category)
            .map(|counts| counts.get(&bin))
            .unwrap_or(0)
    }

    /// Total fills for a category, flow bins included
    pub fn entries(&self, category: &str) -> u64 {
        self.categories
            .get(category)
            .map(Counter::total)
            .unwrap_or(0)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }
}

impl Accumulable for Hist {
    fn identity() -> Self {
        Self::new()
    }

    fn combine(self, other: Self) -> Self {
        Self {
            categories: self.categories.combine(other.categories),
        }
    }
}
