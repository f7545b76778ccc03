//! Knowledge base: mined concept instances plus universals.
//!
//! Universals are facts stated directly by name, description and container
//! relations, gathered while events are added. They are kept as inverted
//! indexes from an object value to the values naming, describing or
//! containing it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{MinerResult, ResultError};
use crate::event::Event;
use crate::graph::construct::GraphConstructor;
use crate::graph::index::ConceptInstanceGraph;
use crate::graph::mine::MiningConfig;
use crate::ontology::{Ontology, RelationKind};
use crate::result::{ConceptInstanceCollection, ConceptRecord, serialization};

/// Version of the knowledge base JSON form.
pub const KNOWLEDGE_VERSION: &str = "1.0";

/// Object type → value → source object type → source values.
pub type UniversalIndex = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeSet<String>>>>;

/// Universals gathered from name, description and container relations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Universals {
    #[serde(default)]
    pub names: UniversalIndex,
    #[serde(default)]
    pub descriptions: UniversalIndex,
    #[serde(default)]
    pub containers: UniversalIndex,
}

impl Universals {
    fn index_mut(&mut self, kind: RelationKind) -> Option<&mut UniversalIndex> {
        match kind {
            RelationKind::Name => Some(&mut self.names),
            RelationKind::Description => Some(&mut self.descriptions),
            RelationKind::Container => Some(&mut self.containers),
            _ => None,
        }
    }

    fn lookup<'a>(index: &'a UniversalIndex, object_type: &str, value: &str) -> Option<&'a BTreeMap<String, BTreeSet<String>>> {
        index.get(object_type).and_then(|values| values.get(value))
    }
}

#[derive(Serialize, Deserialize)]
struct KnowledgeRecord {
    version: String,
    #[serde(default)]
    universals: Universals,
    #[serde(default)]
    concepts: Vec<ConceptRecord>,
}

/// Extracts knowledge from events, both by mining concepts and by gathering
/// universals.
pub struct KnowledgeBase {
    ontology: Arc<Ontology>,
    graph: ConceptInstanceGraph,
    constructor: GraphConstructor,
    universals: Universals,
    concepts: ConceptInstanceCollection,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        let ontology = Arc::new(Ontology::new());
        Self {
            constructor: GraphConstructor::new(Arc::clone(&ontology)),
            ontology,
            graph: ConceptInstanceGraph::new(),
            universals: Universals::default(),
            concepts: ConceptInstanceCollection::new(),
        }
    }

    /// Merge ontology information into the knowledge base. The merged
    /// ontology is validated before it is used for new events.
    pub fn add_ontology(&mut self, ontology: &Ontology) -> MinerResult<&mut Self> {
        let mut merged = Ontology::clone(&self.ontology);
        merged.update(ontology);
        merged.validate()?;
        self.ontology = Arc::new(merged);
        self.constructor.update_ontology(Arc::clone(&self.ontology));
        tracing::debug!(
            event_types = self.ontology.event_types.len(),
            "ontology added to knowledge base"
        );
        Ok(self)
    }

    /// Add an event to the concept graph and gather its universals.
    pub fn add_event(&mut self, event: &Event) -> MinerResult<&mut Self> {
        self.constructor.add(&mut self.graph, event)?;
        self.gather_universals(event)?;
        Ok(self)
    }

    fn gather_universals(&mut self, event: &Event) -> MinerResult<()> {
        let event_type = self.ontology.event_type(&event.event_type)?;
        for relation in &event_type.relations {
            let Some(index) = self.universals.index_mut(relation.kind) else {
                continue;
            };
            if !event.has_values(&relation.source) {
                continue;
            }
            let source = &event_type.property(&event.event_type, &relation.source)?.object_type;
            let target = &event_type.property(&event.event_type, &relation.target)?.object_type;
            for value in event.values(&relation.target) {
                index
                    .entry(target.clone())
                    .or_default()
                    .entry(value.clone())
                    .or_default()
                    .entry(source.clone())
                    .or_default()
                    .extend(event.values(&relation.source).cloned());
            }
        }
        Ok(())
    }

    /// Mine concept instances, discarding earlier mining results.
    ///
    /// With a seed node ID only the instance containing it is mined, otherwise
    /// every object node seeds an instance.
    pub fn mine(&mut self, seed: Option<&str>, config: &MiningConfig) -> MinerResult<&ConceptInstanceCollection> {
        self.graph.reset();
        self.graph.mine(seed, config)?;
        self.concepts = self.graph.extract_result_set()?;
        tracing::info!(
            concepts = self.concepts.len(),
            nodes = self.graph.node_count(),
            "knowledge base mined"
        );
        Ok(&self.concepts)
    }

    pub fn concepts(&self) -> &ConceptInstanceCollection {
        &self.concepts
    }

    pub fn universals(&self) -> &Universals {
        &self.universals
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn graph(&self) -> &ConceptInstanceGraph {
        &self.graph
    }

    /// Names of an object value, keyed by the object type of the names.
    pub fn names_for(&self, object_type: &str, value: &str) -> Option<&BTreeMap<String, BTreeSet<String>>> {
        Universals::lookup(&self.universals.names, object_type, value)
    }

    /// Descriptions of an object value, keyed by the object type of the descriptions.
    pub fn descriptions_for(&self, object_type: &str, value: &str) -> Option<&BTreeMap<String, BTreeSet<String>>> {
        Universals::lookup(&self.universals.descriptions, object_type, value)
    }

    /// Containers (classes or categories) an object value belongs to, keyed
    /// by the object type of the containers.
    pub fn containers_for(&self, object_type: &str, value: &str) -> Option<&BTreeMap<String, BTreeSet<String>>> {
        Universals::lookup(&self.universals.containers, object_type, value)
    }

    /// Copy holding only the instances having the named concept among their
    /// concept names.
    /// Universals are kept.
    pub fn filter_concept(&self, concept: &str) -> Self {
        self.with_concepts(self.concepts.filter_concept(concept))
    }

    /// Copy holding only the instances with a value for the attribute.
    pub fn filter_attribute(&self, attribute: &str) -> Self {
        self.with_concepts(self.concepts.filter_attribute(attribute))
    }

    /// Copy holding only the instances related to any of the given instances.
    pub fn filter_related_concepts<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        self.with_concepts(self.concepts.filter_related_concepts(ids))
    }

    /// A knowledge base without graph, holding the given concepts.
    fn with_concepts(&self, concepts: ConceptInstanceCollection) -> Self {
        Self {
            ontology: Arc::clone(&self.ontology),
            graph: ConceptInstanceGraph::new(),
            constructor: GraphConstructor::new(Arc::clone(&self.ontology)),
            universals: self.universals.clone(),
            concepts,
        }
    }

    fn to_record(&self) -> KnowledgeRecord {
        KnowledgeRecord {
            version: KNOWLEDGE_VERSION.to_string(),
            universals: self.universals.clone(),
            concepts: self.concepts.to_records(),
        }
    }

    /// JSON form holding universals and concepts, without graph internals.
    pub fn to_json(&self) -> MinerResult<String> {
        Ok(serde_json::to_string(&self.to_record()).map_err(serialization)?)
    }

    pub fn to_json_pretty(&self) -> MinerResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_record()).map_err(serialization)?)
    }

    /// Rebuild a knowledge base from the output of [`to_json`](Self::to_json).
    /// The result has no graph, so it cannot be mined further.
    pub fn from_json(json: &str) -> MinerResult<Self> {
        let record: KnowledgeRecord = serde_json::from_str(json).map_err(serialization)?;
        if record.version != KNOWLEDGE_VERSION {
            return Err(ResultError::UnsupportedVersion {
                version: record.version,
            }
            .into());
        }
        let mut knowledge = Self::new();
        knowledge.universals = record.universals;
        knowledge.concepts = ConceptInstanceCollection::from_records(record.concepts);
        Ok(knowledge)
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.concepts)?;
        for (label, index) in [
            ("names", &self.universals.names),
            ("descriptions", &self.universals.descriptions),
            ("containers", &self.universals.containers),
        ] {
            if !index.is_empty() {
                write!(f, ", {label}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("graph", &self.graph)
            .field("concepts", &self.concepts.len())
            .field("events_added", &self.constructor.events_added())
            .finish()
    }
}
