//! Parsed events as seen by the miner.
//!
//! An event is an instance of an event type holding, per property, the set of
//! object values present in it. Reading events from EDXML documents is the job
//! of an external parser; the CLI reads them as JSON lines.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A parsed event: its event type name and its object values per property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, BTreeSet<String>>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds an object value for a property.
    pub fn with_value(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .entry(property.into())
            .or_default()
            .insert(value.into());
        self
    }

    /// Iterates the object values of a property, in sorted order.
    pub fn values<'a>(&'a self, property: &str) -> impl Iterator<Item = &'a String> + use<'a> {
        self.properties.get(property).into_iter().flatten()
    }

    /// Whether the event has at least one value for the property.
    pub fn has_values(&self, property: &str) -> bool {
        self.properties.get(property).is_some_and(|v| !v.is_empty())
    }
}
