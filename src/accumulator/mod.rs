//! Accumulable results
//!
//! Every partial result produced by a processor is an [`Accumulable`]: a
//! value with an identity element and an associative, commutative
//! `combine`. Those two laws are the only thing the executors rely on when
//! merging partials, so partials may be folded in any order and in any
//! grouping (linear fold in arrival order, balanced tree, per-worker
//! pre-combination) with the same final value.
//!
//! Order-sensitive values such as `Vec<T>` deliberately do not implement the
//! trait.

mod counter;
mod hist;


pub use counter::{Counter, Cutflow};
pub use hist::{AxisError, Hist, RegularAxis, MAX_BINS};

use std::collections::BTreeMap;

/// A commutative monoid over partial results
pub trait Accumulable: Sized {
    /// The neutral element: `identity().combine(x) == x`
    fn identity() -> Self;

    /// Merge two partial results. Must be associative and commutative.
    fn combine(self, other: Self) -> Self;
}

impl Accumulable for u64 {
    fn identity() -> Self {
        0
    }

    fn combine(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

impl Accumulable for usize {
    fn identity() -> Self {
        0
    }

    fn combine(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

impl<K: Ord, V: Accumulable> Accumulable for BTreeMap<K, V> {
    fn identity() -> Self {
        BTreeMap::new()
    }

    fn combine(self, other: Self) -> Self {
        // fold the smaller map into the larger one
        let (mut into, from) = if self.len() >= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        for (key, value) in from {
            let merged = match into.remove(&key) {
                Some(existing) => existing.combine(value),
                None => value,
            };
            into.insert(key, merged);
        }
        into
    }
}

/// Fold partial results left to right, starting from the identity
pub fn accumulate<T, I>(items: I) -> T
where
    T: Accumulable,
    I: IntoIterator<Item = T>,
{
    items.into_iter().fold(T::identity(), T::combine)
}

/// Reduce partial results pairwise as a balanced tree
///
/// Produces the same value as [`accumulate`] for any lawful accumulable.
pub fn tree_reduce<T: Accumulable>(mut items: Vec<T>) -> T {
    while items.len() > 1 {
        let mut next = Vec::with_capacity(items.len().div_ceil(2));
        let mut drain = items.into_iter();
        while let Some(left) = drain.next() {
            match drain.next() {
                Some(right) => next.push(left.combine(right)),
                None => next.push(left),
            }
        }
        items = next;
    }
    items.pop().unwrap_or_else(T::identity)
}
