//! Mined concept instances: read-only, serializable results of concept mining.
//!
//! Results expose attribute names, values and confidences, but no graph
//! internals. Node IDs backing an attribute are kept for inspection of a
//! fresh mining result but are not serialized.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ResultError;
use crate::graph::or_combine;
use crate::ontology::DEFAULT_NAMING_PRIORITY;

/// Result type for result set operations.
pub type ResultSetResult<T> = std::result::Result<T, ResultError>;

/// Best concept name and title of an instance without attributes.
pub const EMPTY_CONCEPT: &str = "empty concept";

fn default_naming_priority() -> u8 {
    DEFAULT_NAMING_PRIORITY
}

/// One attribute of a concept instance, seen from its seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptAttribute {
    /// Object type name, a colon and the attribute extension.
    pub name: String,
    pub value: String,
    /// Likelihood that the attribute belongs to the concept instance.
    pub confidence: f64,
    /// Suitability of the value for naming the concept instance.
    #[serde(default = "default_naming_priority")]
    pub concept_naming_priority: u8,
    /// Concepts the attribute was evidenced for, with their confidences.
    #[serde(default)]
    pub concept_names: BTreeMap<String, f64>,
    /// IDs of the graph nodes confirming the attribute.
    #[serde(skip)]
    pub nodes: Vec<String>,
}

impl ConceptAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            confidence,
            concept_naming_priority: DEFAULT_NAMING_PRIORITY,
            concept_names: BTreeMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Name of the object type of the attribute value.
    pub fn object_type_name(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }
}

impl std::fmt::Display for ConceptAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// A discovered entity: a seed with its supporting attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptInstance {
    /// Opaque identifier, the seed node ID for mined instances.
    pub id: String,
    pub attributes: Vec<ConceptAttribute>,
    /// Related concept instance ID → relation confidence.
    pub related: BTreeMap<String, f64>,
}

impl ConceptInstance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Vec::new(),
            related: BTreeMap::new(),
        }
    }

    pub fn add_attribute(&mut self, attribute: ConceptAttribute) {
        self.attributes.push(attribute);
    }

    pub fn add_related_concept(&mut self, id: impl Into<String>, confidence: f64) {
        self.related.insert(id.into(), confidence);
    }

    /// All concepts this may be an instance of, with their confidences.
    pub fn concept_names(&self) -> BTreeMap<String, f64> {
        let mut evidence: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for attribute in &self.attributes {
            for (name, &confidence) in &attribute.concept_names {
                evidence.entry(name.as_str()).or_default().push(confidence);
            }
        }
        evidence
            .into_iter()
            .map(|(name, confidences)| (name.to_string(), or_combine(confidences)))
            .collect()
    }

    /// The most likely concept. Equal confidences resolve to the
    /// lexicographically smallest name.
    pub fn best_concept_name(&self) -> String {
        let mut best: Option<(String, f64)> = None;
        for (name, confidence) in self.concept_names() {
            if best.as_ref().is_none_or(|(_, c)| confidence > *c) {
                best = Some((name, confidence));
            }
        }
        best.map_or_else(|| EMPTY_CONCEPT.to_string(), |(name, _)| name)
    }

    /// The attribute value best suited as a title: highest naming priority
    /// times confidence, first attribute on ties.
    pub fn title(&self) -> &str {
        let mut best: Option<(&str, f64)> = None;
        for attribute in &self.attributes {
            let score = f64::from(attribute.concept_naming_priority) * attribute.confidence;
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((attribute.value.as_str(), score));
            }
        }
        best.map_or(EMPTY_CONCEPT, |(value, _)| value)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// All attributes with the given name.
    pub fn attributes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConceptAttribute> {
        self.attributes.iter().filter(move |a| a.name == name)
    }

    pub fn related_concepts(&self) -> &BTreeMap<String, f64> {
        &self.related
    }
}

impl std::fmt::Display for ConceptInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.best_concept_name(), self.title())
    }
}

/// Flat serialized form of a concept instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ConceptRecord {
    id: String,
    /// Derived; recomputed when loading.
    #[serde(default)]
    title: String,
    /// Derived; recomputed when loading.
    #[serde(default)]
    names: BTreeMap<String, f64>,
    #[serde(default)]
    attributes: Vec<ConceptAttribute>,
    #[serde(default)]
    related: Vec<RelatedRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RelatedRecord {
    id: String,
    confidence: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionRecord {
    concepts: Vec<ConceptRecord>,
}

/// Concept instances keyed by ID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptInstanceCollection {
    concepts: BTreeMap<String, ConceptInstance>,
}

impl ConceptInstanceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance, replacing any instance with the same ID.
    pub fn append(&mut self, concept: ConceptInstance) {
        self.concepts.insert(concept.id.clone(), concept);
    }

    pub fn get(&self, id: &str) -> Option<&ConceptInstance> {
        self.concepts.get(id)
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Instances in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &ConceptInstance> {
        self.concepts.values()
    }

    /// Instances having the named concept among their concept names.
    pub fn filter_concept(&self, concept: &str) -> Self {
        self.filter(|c| c.concept_names().contains_key(concept))
    }

    /// Instances having at least one value for the named attribute.
    pub fn filter_attribute(&self, attribute: &str) -> Self {
        self.filter(|c| c.has_attribute(attribute))
    }

    /// Instances related to any of the given instances.
    pub fn filter_related_concepts<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        self.filter(|c| ids.iter().any(|id| c.related.contains_key(id.as_ref())))
    }

    fn filter(&self, keep: impl Fn(&ConceptInstance) -> bool) -> Self {
        self.iter().filter(|c| keep(c)).cloned().collect()
    }

    pub(crate) fn to_records(&self) -> Vec<ConceptRecord> {
        self.iter()
            .map(|concept| ConceptRecord {
                id: concept.id.clone(),
                title: concept.title().to_string(),
                names: concept.concept_names(),
                attributes: concept.attributes.clone(),
                related: concept
                    .related
                    .iter()
                    .filter(|(id, _)| self.concepts.contains_key(*id))
                    .map(|(id, &confidence)| RelatedRecord {
                        id: id.clone(),
                        confidence,
                    })
                    .collect(),
            })
            .collect()
    }

    pub(crate) fn from_records(records: Vec<ConceptRecord>) -> Self {
        records
            .into_iter()
            .map(|record| {
                let mut concept = ConceptInstance::new(record.id);
                concept.attributes = record.attributes;
                for related in record.related {
                    concept.add_related_concept(related.id, related.confidence);
                }
                concept
            })
            .collect()
    }

    /// Flat JSON form. Related instances outside the collection are left out.
    pub fn to_json(&self) -> ResultSetResult<String> {
        serde_json::to_string(&CollectionRecord {
            concepts: self.to_records(),
        })
        .map_err(serialization)
    }

    pub fn to_json_pretty(&self) -> ResultSetResult<String> {
        serde_json::to_string_pretty(&CollectionRecord {
            concepts: self.to_records(),
        })
        .map_err(serialization)
    }

    /// Rebuild a collection from the output of [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> ResultSetResult<Self> {
        let record: CollectionRecord = serde_json::from_str(json).map_err(serialization)?;
        Ok(Self::from_records(record.concepts))
    }
}

pub(crate) fn serialization(e: serde_json::Error) -> ResultError {
    ResultError::Serialization {
        message: e.to_string(),
    }
}

impl FromIterator<ConceptInstance> for ConceptInstanceCollection {
    fn from_iter<I: IntoIterator<Item = ConceptInstance>>(iter: I) -> Self {
        let mut collection = Self::new();
        for concept in iter {
            collection.append(concept);
        }
        collection
    }
}

impl std::fmt::Display for ConceptInstanceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} concepts", self.len())
    }
}
