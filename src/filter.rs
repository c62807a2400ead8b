//! Live filter selection per dimension (source, market, data type)
//!
//! Each dimension holds either the reserved [`ALL`] sentinel alone or a
//! non-empty set of concrete identifiers, never both and never nothing.

use crate::data::ALL;
use std::collections::BTreeSet;
use std::fmt;

/// Filter dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterDimension {
    Source,
    Market,
    DataType,
}

impl FilterDimension {
    pub const EVERY: [FilterDimension; 3] = [
        FilterDimension::Source,
        FilterDimension::Market,
        FilterDimension::DataType,
    ];

    /// Query parameter name on the stream endpoint
    pub fn query_key(&self) -> &'static str {
        match self {
            FilterDimension::Source => "sources",
            FilterDimension::Market => "markets",
            FilterDimension::DataType => "data_types",
        }
    }
}

impl fmt::Display for FilterDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterDimension::Source => write!(f, "source"),
            FilterDimension::Market => write!(f, "market"),
            FilterDimension::DataType => write!(f, "dataType"),
        }
    }
}

/// Active identifiers of one dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    members: BTreeSet<String>,
}

impl Selection {
    /// Selection with only the "all" sentinel active
    pub fn all() -> Self {
        let mut members = BTreeSet::new();
        members.insert(ALL.to_string());
        Self { members }
    }

    pub fn is_all(&self) -> bool {
        self.members.contains(ALL)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.members.contains(identifier)
    }

    /// Active identifiers in order; `["all"]` when unrestricted
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn toggle(&mut self, identifier: &str) {
        if identifier == ALL {
            self.members.clear();
            self.members.insert(ALL.to_string());
            return;
        }

        self.members.remove(ALL);
        if !self.members.remove(identifier) {
            self.members.insert(identifier.to_string());
        }

        if self.members.is_empty() {
            self.members.insert(ALL.to_string());
        }
    }

    /// Comma-joined members, `None` when the dimension is unrestricted
    fn query_value(&self) -> Option<String> {
        if self.is_all() {
            None
        } else {
            Some(self.members().collect::<Vec<_>>().join(","))
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::all()
    }
}

/// Snapshot of all three dimensions, used to build a stream subscription
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSelection {
    sources: Selection,
    markets: Selection,
    data_types: Selection,
}

impl FilterSelection {
    pub fn get(&self, dimension: FilterDimension) -> &Selection {
        match dimension {
            FilterDimension::Source => &self.sources,
            FilterDimension::Market => &self.markets,
            FilterDimension::DataType => &self.data_types,
        }
    }

    fn get_mut(&mut self, dimension: FilterDimension) -> &mut Selection {
        match dimension {
            FilterDimension::Source => &mut self.sources,
            FilterDimension::Market => &mut self.markets,
            FilterDimension::DataType => &mut self.data_types,
        }
    }

    /// Query parameters for the stream URL; unrestricted dimensions are omitted
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        FilterDimension::EVERY
            .iter()
            .filter_map(|dim| self.get(*dim).query_value().map(|value| (dim.query_key(), value)))
            .collect()
    }
}

/// User-driven filter state
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    selection: FilterSelection,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle one identifier of a dimension.
    ///
    /// Unknown identifiers are stored as-is. Every call counts as a change
    /// and the caller is expected to resubscribe the stream.
    pub fn toggle(&mut self, dimension: FilterDimension, identifier: &str) -> &Selection {
        self.selection.get_mut(dimension).toggle(identifier);

        tracing::debug!(
            "Filter {} toggled '{}' -> {:?}",
            dimension,
            identifier,
            self.selection.get(dimension).members().collect::<Vec<_>>()
        );

        self.selection.get(dimension)
    }

    pub fn active_selections(&self, dimension: FilterDimension) -> &Selection {
        self.selection.get(dimension)
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }
}
