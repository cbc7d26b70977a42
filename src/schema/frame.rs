//! Base schema: a flat frame of raw branches

use super::{ChunkMetadata, EventView, Layout, SchemaAdapter, SchemaError};
use crate::source::{Branch, RawColumns};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Flat(Vec<f64>),
    Jagged(Vec<Vec<f64>>),
}

impl Column {
    pub fn as_flat(&self) -> Option<&[f64]> {
        match self {
            Column::Flat(values) => Some(values),
            Column::Jagged(_) => None,
        }
    }

    pub fn as_jagged(&self) -> Option<&[Vec<f64>]> {
        match self {
            Column::Jagged(lists) => Some(lists),
            Column::Flat(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataFrame {
    columns: BTreeMap<String, Column>,
}

impl DataFrame {
    pub fn column(&self, name: &str) -> Result<&Column, SchemaError> {
        self.columns
            .get(name)
            .ok_or_else(|| SchemaError::MissingBranch {
                branch: name.to_string(),
            })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

/// Exposes every branch as a column. With `flatten`, jagged branches are
/// replaced by their concatenated contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseSchema {
    pub flatten: bool,
}

impl SchemaAdapter for BaseSchema {
    fn build(&self, raw: RawColumns, metadata: ChunkMetadata) -> Result<EventView, SchemaError> {
        let columns = raw
            .branches
            .into_iter()
            .map(|(name, branch)| {
                let column = match branch {
                    Branch::Flat(values) => Column::Flat(values),
                    Branch::Jagged(lists) if self.flatten => {
                        Column::Flat(lists.into_iter().flatten().collect())
                    }
                    Branch::Jagged(lists) => Column::Jagged(lists),
                };
                (name, column)
            })
            .collect();

        Ok(EventView::new(
            metadata,
            raw.entries,
            Layout::Frame(DataFrame { columns }),
        ))
    }
}
