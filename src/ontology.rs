//! Ontology snapshot consumed by graph construction.
//!
//! The ontology describes, per event type, which properties carry object
//! values, which concepts those values identify and how properties relate to
//! each other. The miner only reads it: a snapshot is built (or loaded from
//! TOML / JSON), validated once and then shared immutably.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OntologyError;

/// Result type for ontology operations.
pub type OntologyResult<T> = std::result::Result<T, OntologyError>;

/// Default concept naming priority of a property / concept association.
pub const DEFAULT_NAMING_PRIORITY: u8 = 128;

/// Highest confidence on the 1..=10 authoring scale.
pub const MAX_CONFIDENCE: u8 = 10;

fn default_confidence() -> u8 {
    MAX_CONFIDENCE
}

fn default_naming_priority() -> u8 {
    DEFAULT_NAMING_PRIORITY
}

/// Stores `value` under `key`, replacing any earlier definition.
fn replace<V>(map: &mut BTreeMap<String, V>, key: String, value: V) -> &mut V {
    match map.entry(key) {
        Entry::Occupied(mut slot) => {
            slot.insert(value);
            slot.into_mut()
        }
        Entry::Vacant(slot) => slot.insert(value),
    }
}

/// Converts a confidence on the 1..=10 authoring scale into a probability.
pub fn scale_confidence(confidence: u8) -> f64 {
    0.1 * f64::from(confidence)
}

/// Returns true when both concept names lie on the same branch of the concept
/// hierarchy, meaning they are equal or one specializes the other.
///
/// Concept names form a dotted namespace: `computer.server` specializes
/// `computer`, while `computer.server` and `computer.laptop` are siblings on
/// different branches.
pub fn concept_names_share_branch(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    match long.strip_prefix(short) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

/// The class of a property relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Both properties describe two different, related concept instances.
    Inter,
    /// Both properties describe the same concept instance.
    Intra,
    /// The source value is a name of the target value.
    Name,
    /// The source value describes the target value.
    Description,
    /// The source value is a class the target value belongs to.
    Container,
    /// Any other relation. Ignored by the miner.
    Other,
}

impl RelationKind {
    /// Concept relations are the ones that take part in concept mining.
    pub fn is_concept_relation(self) -> bool {
        matches!(self, Self::Inter | Self::Intra)
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Inter => "inter",
            Self::Intra => "intra",
            Self::Name => "name",
            Self::Description => "description",
            Self::Container => "container",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Association between a property and a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptAssociation {
    /// How strongly property values identify instances of the concept (1..=10).
    #[serde(default = "default_confidence")]
    pub confidence: u8,
    /// How suitable property values are for naming a concept instance.
    #[serde(default = "default_naming_priority")]
    pub naming_priority: u8,
    /// Extension appended to the object type name to form the attribute name.
    #[serde(default)]
    pub attribute_extension: String,
}

impl ConceptAssociation {
    pub fn new(confidence: u8) -> Self {
        Self {
            confidence,
            naming_priority: DEFAULT_NAMING_PRIORITY,
            attribute_extension: String::new(),
        }
    }

    pub fn set_naming_priority(&mut self, priority: u8) -> &mut Self {
        self.naming_priority = priority;
        self
    }

    pub fn set_attribute(&mut self, extension: impl Into<String>) -> &mut Self {
        self.attribute_extension = extension.into();
        self
    }

    /// Full concept attribute name: object type name, a colon and the extension.
    pub fn attribute_name(&self, object_type: &str) -> String {
        format!("{object_type}:{}", self.attribute_extension)
    }
}

/// A property of an event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventProperty {
    /// Name of the object type of the property values.
    pub object_type: String,
    /// Concept associations keyed by concept name.
    #[serde(default)]
    pub concepts: BTreeMap<String, ConceptAssociation>,
}

impl EventProperty {
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            concepts: BTreeMap::new(),
        }
    }

    /// Associates the property with a concept, returning the association.
    pub fn identifies(&mut self, concept: impl Into<String>, confidence: u8) -> &mut ConceptAssociation {
        replace(&mut self.concepts, concept.into(), ConceptAssociation::new(confidence))
    }
}

/// A relation between two properties of an event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRelation {
    pub source: String,
    pub target: String,
    /// Concept of the source property taking part in the relation.
    #[serde(default)]
    pub source_concept: Option<String>,
    /// Concept of the target property taking part in the relation.
    #[serde(default)]
    pub target_concept: Option<String>,
    pub kind: RelationKind,
    /// Human readable predicate, e.g. "logged in on".
    #[serde(default)]
    pub predicate: String,
    /// Relation confidence on the 1..=10 authoring scale.
    #[serde(default = "default_confidence")]
    pub confidence: u8,
}

impl PropertyRelation {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_concept: None,
            target_concept: None,
            kind,
            predicate: String::new(),
            confidence: MAX_CONFIDENCE,
        }
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_concepts(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_concept = Some(source.into());
        self.target_concept = Some(target.into());
        self
    }

    pub fn set_predicate(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.predicate = predicate.into();
        self
    }

    /// The relation confidence as a probability in [0, 1].
    pub fn probability(&self) -> f64 {
        scale_confidence(self.confidence)
    }

    /// The same relation viewed from its target.
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
            source_concept: self.target_concept.clone(),
            target_concept: self.source_concept.clone(),
            ..self.clone()
        }
    }
}

/// An event type: its properties and the relations between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventType {
    #[serde(default)]
    pub properties: BTreeMap<String, EventProperty>,
    #[serde(default)]
    pub relations: Vec<PropertyRelation>,
}

impl EventType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a property, returning it for further configuration.
    pub fn create_property(&mut self, name: impl Into<String>, object_type: impl Into<String>) -> &mut EventProperty {
        replace(&mut self.properties, name.into(), EventProperty::new(object_type))
    }

    /// Adds a relation, returning it for further configuration.
    pub fn add_relation(&mut self, relation: PropertyRelation) -> &mut PropertyRelation {
        self.relations.push(relation);
        let last = self.relations.len() - 1;
        &mut self.relations[last]
    }

    pub fn relate_intra(&mut self, source: &str, target: &str, confidence: u8) -> &mut PropertyRelation {
        self.add_relation(PropertyRelation::new(source, target, RelationKind::Intra).with_confidence(confidence))
    }

    pub fn relate_inter(&mut self, source: &str, target: &str, confidence: u8) -> &mut PropertyRelation {
        self.add_relation(PropertyRelation::new(source, target, RelationKind::Inter).with_confidence(confidence))
    }

    pub fn relate_name(&mut self, source: &str, target: &str) -> &mut PropertyRelation {
        self.add_relation(PropertyRelation::new(source, target, RelationKind::Name))
    }

    pub fn relate_description(&mut self, source: &str, target: &str) -> &mut PropertyRelation {
        self.add_relation(PropertyRelation::new(source, target, RelationKind::Description))
    }

    pub fn relate_container(&mut self, source: &str, target: &str) -> &mut PropertyRelation {
        self.add_relation(PropertyRelation::new(source, target, RelationKind::Container))
    }

    /// Looks up a property of this event type.
    pub fn property(&self, event_type: &str, name: &str) -> OntologyResult<&EventProperty> {
        self.properties
            .get(name)
            .ok_or_else(|| OntologyError::UnknownProperty {
                event_type: event_type.into(),
                property: name.into(),
            })
    }

    /// Resolves the concept that `property` contributes to `relation`.
    ///
    /// An explicitly named concept must be associated with the property. When
    /// none is named, the property must have exactly one association.
    pub fn relation_concept<'a>(
        &'a self,
        event_type: &str,
        property: &str,
        named: Option<&'a str>,
    ) -> OntologyResult<(&'a str, &'a ConceptAssociation)> {
        let prop = self.property(event_type, property)?;

        match named {
            Some(concept) => prop
                .concepts
                .get_key_value(concept)
                .map(|(name, assoc)| (name.as_str(), assoc))
                .ok_or_else(|| OntologyError::UnknownConceptAssociation {
                    event_type: event_type.into(),
                    property: property.into(),
                    concept: concept.into(),
                }),
            None => {
                let mut concepts = prop.concepts.iter();
                match (concepts.next(), concepts.next()) {
                    (Some((name, assoc)), None) => Ok((name.as_str(), assoc)),
                    _ => Err(OntologyError::AmbiguousConcept {
                        event_type: event_type.into(),
                        property: property.into(),
                    }),
                }
            }
        }
    }
}

/// Immutable ontology snapshot: event types keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ontology {
    #[serde(default)]
    pub event_types: BTreeMap<String, EventType>,
}

impl Ontology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) an event type, returning it for further configuration.
    pub fn create_event_type(&mut self, name: impl Into<String>) -> &mut EventType {
        replace(&mut self.event_types, name.into(), EventType::new())
    }

    pub fn event_type(&self, name: &str) -> OntologyResult<&EventType> {
        self.event_types
            .get(name)
            .ok_or_else(|| OntologyError::UnknownEventType { name: name.into() })
    }

    /// Merges another ontology into this one. Event types from `other`
    /// replace same-named event types.
    pub fn update(&mut self, other: &Ontology) -> &mut Self {
        for (name, event_type) in &other.event_types {
            self.event_types.insert(name.clone(), event_type.clone());
        }
        self
    }

    /// Checks confidence ranges and that relations refer to defined
    /// properties and concept associations.
    pub fn validate(&self) -> OntologyResult<()> {
        for (type_name, event_type) in &self.event_types {
            for (prop_name, prop) in &event_type.properties {
                for (concept, assoc) in &prop.concepts {
                    if !(1..=MAX_CONFIDENCE).contains(&assoc.confidence) {
                        return Err(OntologyError::InvalidConfidence {
                            what: format!("association {type_name}.{prop_name} => {concept}"),
                            value: assoc.confidence,
                        });
                    }
                }
            }
            for relation in &event_type.relations {
                if !(1..=MAX_CONFIDENCE).contains(&relation.confidence) {
                    return Err(OntologyError::InvalidConfidence {
                        what: format!(
                            "relation {type_name}.{} -> {}",
                            relation.source, relation.target
                        ),
                        value: relation.confidence,
                    });
                }
                if relation.kind.is_concept_relation() {
                    event_type.relation_concept(
                        type_name,
                        &relation.source,
                        relation.source_concept.as_deref(),
                    )?;
                    event_type.relation_concept(
                        type_name,
                        &relation.target,
                        relation.target_concept.as_deref(),
                    )?;
                } else {
                    for property in [&relation.source, &relation.target] {
                        if !event_type.properties.contains_key(property) {
                            return Err(OntologyError::UnknownProperty {
                                event_type: type_name.clone(),
                                property: property.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> OntologyResult<Self> {
        toml::from_str(content).map_err(|e| OntologyError::Parse {
            message: e.to_string(),
        })
    }

    pub fn from_json_str(content: &str) -> OntologyResult<Self> {
        serde_json::from_str(content).map_err(|e| OntologyError::Parse {
            message: e.to_string(),
        })
    }

    /// Load from a `.json` file, or from TOML for any other extension.
    pub fn load(path: &Path) -> OntologyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| OntologyError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let ontology = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        tracing::debug!(
            path = %path.display(),
            event_types = ontology.event_types.len(),
            "loaded ontology"
        );
        Ok(ontology)
    }
}
