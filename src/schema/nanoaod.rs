//! NanoAOD-style schema
//!
//! Jagged branches named `X_field` are grouped into a collection `X`. A flat
//! branch `nX`, when present, is the per-entry multiplicity of `X` and must
//! agree with every field of the collection. Flat branches stay available
//! as per-entry fields.

use super::{ChunkMetadata, EventView, Layout, SchemaAdapter, SchemaError};
use crate::source::{Branch, RawColumns};
use std::collections::BTreeMap;
use std::ops::Range;

/// A jagged collection: per-entry variable-length lists sharing offsets
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    name: String,
    offsets: Vec<usize>,
    fields: BTreeMap<String, Vec<f64>>,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries (events), not of collection elements
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Multiplicity at `entry`, or `None` past the last entry
    pub fn count(&self, entry: usize) -> Option<usize> {
        self.range(entry).map(|range| range.len())
    }

    pub fn counts(&self) -> impl Iterator<Item = usize> + '_ {
        self.offsets.windows(2).map(|w| w[1] - w[0])
    }

    /// Total number of elements across all entries
    pub fn total(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn range(&self, entry: usize) -> Option<Range<usize>> {
        let start = *self.offsets.get(entry)?;
        let stop = *self.offsets.get(entry + 1)?;
        Some(start..stop)
    }

    /// Flattened contents of a field
    pub fn field(&self, field: &str) -> Result<&[f64], SchemaError> {
        self.fields
            .get(field)
            .map(Vec::as_slice)
            .ok_or_else(|| SchemaError::MissingField {
                collection: self.name.clone(),
                field: field.to_string(),
            })
    }

    /// A field's values for a single entry
    pub fn entry_field(&self, field: &str, entry: usize) -> Result<&[f64], SchemaError> {
        let values = self.field(field)?;
        let range = self
            .range(entry)
            .ok_or_else(|| SchemaError::EntryOutOfRange {
                collection: self.name.clone(),
                entry,
                entries: self.len(),
            })?;
        Ok(&values[range])
    }
}

#[derive(Debug, Clone, Default)]
pub struct NanoEvents {
    fields: BTreeMap<String, Vec<f64>>,
    collections: BTreeMap<String, Collection>,
}

impl NanoEvents {
    pub fn field(&self, name: &str) -> Result<&[f64], SchemaError> {
        self.fields
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| SchemaError::MissingBranch {
                branch: name.to_string(),
            })
    }

    pub fn collection(&self, name: &str) -> Result<&Collection, SchemaError> {
        self.collections
            .get(name)
            .ok_or_else(|| SchemaError::MissingCollection {
                collection: name.to_string(),
            })
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NanoAodSchema;

impl SchemaAdapter for NanoAodSchema {
    fn build(&self, raw: RawColumns, metadata: ChunkMetadata) -> Result<EventView, SchemaError> {
        let entries = raw.entries;
        let mut fields = BTreeMap::new();
        let mut jagged: BTreeMap<String, BTreeMap<String, Vec<Vec<f64>>>> = BTreeMap::new();

        for (name, branch) in raw.branches {
            match branch {
                Branch::Flat(values) => {
                    fields.insert(name, values);
                }
                Branch::Jagged(lists) => {
                    let Some((collection, field)) = name.split_once('_') else {
                        return Err(SchemaError::UnsupportedBranch { branch: name });
                    };
                    jagged
                        .entry(collection.to_string())
                        .or_default()
                        .insert(field.to_string(), lists);
                }
            }
        }

        let mut collections = BTreeMap::new();
        for (name, members) in jagged {
            let counter = fields.get(&format!("n{name}")).map(Vec::as_slice);
            let collection = build_collection(&name, members, counter, entries)?;
            collections.insert(name, collection);
        }

        // counter branches without fields still describe a collection
        for (branch, values) in &fields {
            let Some(name) = counter_target(branch) else {
                continue;
            };
            if collections.contains_key(name) {
                continue;
            }
            let counts = parse_counts(branch, values)?;
            collections.insert(
                name.to_string(),
                Collection {
                    name: name.to_string(),
                    offsets: offsets_from(&counts),
                    fields: BTreeMap::new(),
                },
            );
        }

        Ok(EventView::new(
            metadata,
            entries,
            Layout::Collections(NanoEvents {
                fields,
                collections,
            }),
        ))
    }
}

/// `nMuon` -> `Muon`
fn counter_target(branch: &str) -> Option<&str> {
    branch
        .strip_prefix('n')
        .filter(|rest| rest.chars().next().is_some_and(char::is_uppercase))
}

fn parse_counts(counter: &str, values: &[f64]) -> Result<Vec<usize>, SchemaError> {
    values
        .iter()
        .enumerate()
        .map(|(entry, &value)| {
            if value >= 0.0 && value.fract() == 0.0 {
                Ok(value as usize)
            } else {
                Err(SchemaError::InvalidCount {
                    counter: counter.to_string(),
                    entry,
                    value,
                })
            }
        })
        .collect()
}

fn offsets_from(counts: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    offsets.push(0);
    let mut total = 0;
    for count in counts {
        total += count;
        offsets.push(total);
    }
    offsets
}

fn build_collection(
    name: &str,
    members: BTreeMap<String, Vec<Vec<f64>>>,
    counter: Option<&[f64]>,
    entries: usize,
) -> Result<Collection, SchemaError> {
    let (reference, counts): (String, Vec<usize>) = match counter {
        Some(values) => {
            let branch = format!("n{name}");
            let counts = parse_counts(&branch, values)?;
            (branch, counts)
        }
        None => match members.iter().next() {
            Some((field, lists)) => {
                (format!("{name}_{field}"), lists.iter().map(Vec::len).collect())
            }
            None => (name.to_string(), vec![0; entries]),
        },
    };
    debug_assert_eq!(counts.len(), entries);

    let mut fields = BTreeMap::new();
    for (field, lists) in members {
        for (entry, (list, &expected)) in lists.iter().zip(&counts).enumerate() {
            if list.len() != expected {
                return Err(SchemaError::CountMismatch {
                    counter: reference.clone(),
                    branch: format!("{name}_{field}"),
                    entry,
                    expected,
                    actual: list.len(),
                });
            }
        }
        fields.insert(field, lists.into_iter().flatten().collect());
    }

    Ok(Collection {
        name: name.to_string(),
        offsets: offsets_from(&counts),
        fields,
    })
}
