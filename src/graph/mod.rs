//! Concept graph: object value nodes joined by confidence-carrying inferences.
//!
//! The graph has two kinds of nodes and two kinds of edges:
//!
//! - **Event object nodes**: one occurrence of an object value in one event,
//!   for one property / concept association.
//! - **Object hubs**: synthetic nodes joining all occurrences of one object
//!   value across events.
//! - **Relation inferences**: edges backing ontology property relations.
//! - **Same object inferences**: edges between an object node and its hub.
//!
//! The arena lives in [`index::ConceptInstanceGraph`]. Construction is done by
//! [`construct::GraphConstructor`], mining by [`mine`] and result extraction
//! by [`extract`].

pub mod construct;
pub mod extract;
pub mod index;
pub mod mine;

use std::collections::{BTreeMap, BTreeSet};

pub use petgraph::stable_graph::{EdgeIndex, NodeIndex};

use crate::ontology::{ConceptAssociation, PropertyRelation, RelationKind, scale_confidence};

/// Combines independent pieces of evidence: `1 − ∏(1 − cᵢ)`.
///
/// The result is the probability that at least one piece of evidence is
/// correct. An empty iterator yields 0.0.
pub fn or_combine<I>(confidences: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    1.0 - confidences
        .into_iter()
        .fold(1.0, |remaining, c| remaining * (1.0 - c))
}

/// One concrete occurrence of an object value inside one event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventObject {
    /// Sequential ID the constructor assigned to the event.
    pub event_id: String,
    pub property: String,
    /// Concept the property is associated with.
    pub concept: String,
    /// Concept attribute name, see [`ConceptAssociation::attribute_name`].
    pub attribute_name: String,
    pub naming_priority: u8,
    /// Association confidence as a probability.
    pub concept_confidence: f64,
}

/// Node variants.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    EventObject(EventObject),
    /// Joins all occurrences of one object value.
    Hub,
}

/// Transient per-run annotations of a node. Cleared by a graph reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeState {
    /// Seed ID → confidence that the node belongs to the seed's concept instance.
    pub seed_confidences: BTreeMap<String, f64>,
    /// Concept name → seed ID → confidence that the node evidences the concept
    /// for the seed's concept instance.
    pub concept_name_equivalents: BTreeMap<String, BTreeMap<String, f64>>,
    /// Highest path confidence the node was expanded with.
    pub taint: f64,
    /// Hop distance from the seed of the most recent run.
    pub depth: usize,
    pub visited: bool,
    /// Edge used to arrive at the node.
    pub reason: Option<EdgeIndex>,
    /// Edges used to infer other nodes from this one.
    pub conclusions: BTreeSet<EdgeIndex>,
}

/// A node of the concept graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Stable, opaque node identity.
    pub id: String,
    pub object_type: String,
    pub value: String,
    /// Intrinsic confidence in [0.0, 1.0].
    pub confidence: f64,
    pub kind: NodeKind,
    pub state: NodeState,
}

impl Node {
    /// Create the node for one value of one property / concept association
    /// in one event.
    pub fn event_object(
        event_id: &str,
        property: &str,
        concept: &str,
        association: &ConceptAssociation,
        object_type: &str,
        value: &str,
    ) -> Self {
        let confidence = scale_confidence(association.confidence);
        Self {
            id: Self::object_id(event_id, property, concept, value),
            object_type: object_type.to_string(),
            value: value.to_string(),
            confidence,
            kind: NodeKind::EventObject(EventObject {
                event_id: event_id.to_string(),
                property: property.to_string(),
                concept: concept.to_string(),
                attribute_name: association.attribute_name(object_type),
                naming_priority: association.naming_priority,
                concept_confidence: confidence,
            }),
            state: NodeState::default(),
        }
    }

    /// Create the hub for an object value.
    pub fn hub(object_type: &str, value: &str) -> Self {
        Self {
            id: Self::hub_id(object_type, value),
            object_type: object_type.to_string(),
            value: value.to_string(),
            confidence: 1.0,
            kind: NodeKind::Hub,
            state: NodeState::default(),
        }
    }

    pub fn object_id(event_id: &str, property: &str, concept: &str, value: &str) -> String {
        format!("obj:{event_id}:{property}:{concept}:{value}")
    }

    pub fn hub_id(object_type: &str, value: &str) -> String {
        format!("hub:{object_type}:{value}")
    }

    pub fn is_hub(&self) -> bool {
        matches!(self.kind, NodeKind::Hub)
    }

    pub fn as_event_object(&self) -> Option<&EventObject> {
        match &self.kind {
            NodeKind::EventObject(object) => Some(object),
            NodeKind::Hub => None,
        }
    }

    /// Concept of the node. Hubs have none.
    pub fn concept_name(&self) -> Option<&str> {
        self.as_event_object().map(|o| o.concept.as_str())
    }

    /// Confidence of belonging to the concept instance of `seed_id`, 0.0 if unknown.
    pub fn seed_confidence(&self, seed_id: &str) -> f64 {
        self.state.seed_confidences.get(seed_id).copied().unwrap_or(0.0)
    }

    /// Return the node to its freshly constructed state.
    pub fn reset(&mut self) {
        self.state = NodeState::default();
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            NodeKind::EventObject(object) => write!(f, "{} = {}", object.attribute_name, self.value),
            NodeKind::Hub => f.write_str(&self.value),
        }
    }
}

/// Edge variants.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceKind {
    /// Backs an ontology property relation.
    Relation { class: RelationKind, predicate: String },
    /// Connects an object node with the hub of its value.
    SameObject,
}

/// A directed, confidence-carrying edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub kind: InferenceKind,
    /// Confidence in [0.0, 1.0] of inferring the target from the source.
    pub confidence: f64,
    /// Seeds whose mining run used this edge.
    pub seeds: BTreeSet<String>,
}

impl Inference {
    pub fn relation(relation: &PropertyRelation) -> Self {
        Self {
            kind: InferenceKind::Relation {
                class: relation.kind,
                predicate: relation.predicate.clone(),
            },
            confidence: relation.probability(),
            seeds: BTreeSet::new(),
        }
    }

    pub fn same_object(confidence: f64) -> Self {
        Self {
            kind: InferenceKind::SameObject,
            confidence: confidence.clamp(0.0, 1.0),
            seeds: BTreeSet::new(),
        }
    }

    /// Intra-concept relations join properties describing the same concept instance.
    pub fn is_intra(&self) -> bool {
        matches!(
            self.kind,
            InferenceKind::Relation {
                class: RelationKind::Intra,
                ..
            }
        )
    }

    /// Inter-concept relations join properties describing two related concept instances.
    pub fn is_inter(&self) -> bool {
        matches!(
            self.kind,
            InferenceKind::Relation {
                class: RelationKind::Inter,
                ..
            }
        )
    }

    pub fn is_same_object(&self) -> bool {
        matches!(self.kind, InferenceKind::SameObject)
    }
}
