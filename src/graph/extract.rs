//! Result extraction: turns mined graph state into concept instances.

use std::collections::{BTreeMap, HashMap};

use crate::error::{GraphError, MinerResult};
use crate::result::{ConceptAttribute, ConceptInstance, ConceptInstanceCollection};

use super::index::ConceptInstanceGraph;
use super::{NodeIndex, or_combine};

/// Nodes supporting one attribute of a concept instance.
struct AttributeGroup<'a> {
    name: &'a str,
    value: &'a str,
    naming_priority: u8,
    members: Vec<(NodeIndex, f64)>,
    concepts: BTreeMap<&'a str, Vec<f64>>,
}

impl ConceptInstanceGraph {
    /// Build the concept instances of all seeds mined since the last reset.
    pub fn extract_result_set(&self) -> MinerResult<ConceptInstanceCollection> {
        let mut collection = ConceptInstanceCollection::new();
        for seed in &self.mined_seeds {
            collection.append(self.extract_instance(seed)?);
        }
        tracing::debug!(concepts = collection.len(), "extracted concept instances");
        Ok(collection)
    }

    /// Build the concept instance of one mined seed.
    ///
    /// Nodes carrying a confidence for the seed are grouped into attributes by
    /// attribute name and value, in node order. Confidences of nodes backing
    /// the same attribute are OR-combined, per attribute and per concept.
    pub fn extract_instance(&self, seed: &str) -> MinerResult<ConceptInstance> {
        let seed_idx = self
            .find(seed)
            .ok_or_else(|| GraphError::NodeNotFound { id: seed.to_string() })?;
        if self.graph[seed_idx].seed_confidence(seed) <= 0.0 {
            return Err(GraphError::SeedMissing { seed: seed.to_string() }.into());
        }

        let mut groups: Vec<AttributeGroup<'_>> = Vec::new();
        let mut by_key: HashMap<(&str, &str), usize> = HashMap::new();
        for (idx, node) in self.nodes() {
            let Some(object) = node.as_event_object() else {
                continue;
            };
            let confidence = node.seed_confidence(seed);
            if confidence <= 0.0 {
                continue;
            }
            let key = (object.attribute_name.as_str(), node.value.as_str());
            let slot = *by_key.entry(key).or_insert_with(|| {
                groups.push(AttributeGroup {
                    name: key.0,
                    value: key.1,
                    naming_priority: 0,
                    members: Vec::new(),
                    concepts: BTreeMap::new(),
                });
                groups.len() - 1
            });
            let group = &mut groups[slot];
            group.naming_priority = group.naming_priority.max(object.naming_priority);
            group.members.push((idx, confidence));
            group
                .concepts
                .entry(object.concept.as_str())
                .or_default()
                .push(confidence);
        }

        let mut instance = ConceptInstance::new(seed);
        for group in &groups {
            let mut attribute = ConceptAttribute::new(
                group.name,
                group.value,
                or_combine(group.members.iter().map(|&(_, c)| c)),
            );
            attribute.concept_naming_priority = group.naming_priority;
            attribute.concept_names = group
                .concepts
                .iter()
                .map(|(name, confidences)| (name.to_string(), or_combine(confidences.iter().copied())))
                .collect();
            attribute.nodes = group
                .members
                .iter()
                .map(|&(idx, _)| self.graph[idx].id.clone())
                .collect();
            instance.add_attribute(attribute);
        }

        for (related, confidence) in self.related_instances(seed, &groups) {
            instance.add_related_concept(related, confidence);
        }

        tracing::trace!(
            seed,
            attributes = instance.attributes.len(),
            related = instance.related.len(),
            "extracted concept instance"
        );
        Ok(instance)
    }

    /// Confidences of relations to other mined instances, following the inter
    /// concept relations leaving the nodes of this instance.
    ///
    /// Each relation contributes the product of the source's confidence for
    /// this seed, the relation confidence and the target's confidence for the
    /// related seed.
    fn related_instances(&self, seed: &str, groups: &[AttributeGroup<'_>]) -> BTreeMap<String, f64> {
        let mut evidence: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for &(idx, source_confidence) in groups.iter().flat_map(|g| &g.members) {
            for (_, target, inference) in self.outgoing(idx) {
                if !inference.is_inter() {
                    continue;
                }
                for (related, &target_confidence) in &self.graph[target].state.seed_confidences {
                    if related == seed || !self.mined_seeds.contains(related) {
                        continue;
                    }
                    evidence
                        .entry(related.as_str())
                        .or_default()
                        .push(source_confidence * inference.confidence * target_confidence);
                }
            }
        }
        evidence
            .into_iter()
            .map(|(related, confidences)| (related.to_string(), or_combine(confidences)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::MinerError;
    use crate::event::Event;
    use crate::graph::construct::GraphConstructor;
    use crate::graph::mine::MiningConfig;
    use crate::ontology::Ontology;

    const EPSILON: f64 = 1e-6;

    fn build(ontology: Ontology, events: &[Event]) -> ConceptInstanceGraph {
        let mut graph = ConceptInstanceGraph::new();
        let mut constructor = GraphConstructor::new(Arc::new(ontology));
        for event in events {
            constructor.add(&mut graph, event).unwrap();
        }
        graph
    }

    fn mine_concept(graph: &mut ConceptInstanceGraph, seed: &str, min_confidence: f64) -> ConceptInstance {
        graph.reset();
        let config = MiningConfig::default().with_min_confidence(min_confidence);
        graph.mine(Some(seed), &config).unwrap();
        let result = graph.extract_result_set().unwrap();
        assert_eq!(result.len(), 1);
        result.get(seed).unwrap().clone()
    }

    fn shared_value(concept_a: &str, concept_b: &str) -> ConceptInstanceGraph {
        let mut ontology = Ontology::new();
        ontology
            .create_event_type("a")
            .create_property("a", "a")
            .identifies(concept_a, 10);
        ontology
            .create_event_type("b")
            .create_property("a", "a")
            .identifies(concept_b, 10);
        build(
            ontology,
            &[
                Event::new("a").with_value("a", "value"),
                Event::new("b").with_value("a", "value"),
            ],
        )
    }

    #[test]
    fn shared_object_attribute_backed_by_specialized_concept() {
        let mut graph = shared_value("c1", "c1.2");
        let concept = mine_concept(&mut graph, "obj:0:a:c1:value", 0.1);
        assert_eq!(concept.attributes.len(), 1);
        assert_eq!(concept.attributes[0].nodes.len(), 2);
        assert_eq!(concept.attributes[0].confidence, 1.0);
        let names: Vec<&String> = concept.attributes[0].concept_names.keys().collect();
        assert_eq!(names, ["c1", "c1.2"]);
    }

    #[test]
    fn shared_object_attribute_ignores_unrelated_concept() {
        let mut graph = shared_value("c1", "c2");
        let concept = mine_concept(&mut graph, "obj:0:a:c1:value", 0.1);
        assert_eq!(concept.attributes[0].nodes.len(), 1);
        assert_eq!(concept.best_concept_name(), "c1");
        assert_eq!(concept.title(), "value");
    }

    #[test]
    fn heterogeneous_concepts() {
        let rel_confidence = 2u8;
        let mut ontology = Ontology::new();
        let a = ontology.create_event_type("a");
        a.create_property("p1", "a").identifies("c1", 10);
        a.create_property("p2", "a").identifies("c2", 10);
        a.relate_intra("p1", "p2", rel_confidence).set_predicate("related to");
        ontology
            .create_event_type("b")
            .create_property("p1", "a")
            .identifies("c2", 10);
        let mut graph = build(
            ontology,
            &[
                Event::new("a").with_value("p1", "a").with_value("p2", "b"),
                Event::new("b").with_value("p1", "b"),
            ],
        );
        let seed = "obj:0:p1:c1:a";
        let r = 0.1 * f64::from(rel_confidence);

        let concept = mine_concept(&mut graph, seed, r - EPSILON);
        let attr_b = concept.attributes.iter().find(|a| a.value == "b").unwrap();
        assert_eq!(attr_b.nodes.len(), 1);
        assert_eq!(attr_b.concept_names.len(), 1);
        assert!((attr_b.concept_names["c2"] - (1.0 - (1.0 - 0.2))).abs() < 1e-12);

        let concept = mine_concept(&mut graph, seed, r.powi(2) - EPSILON);
        let attr_b = concept.attributes.iter().find(|a| a.value == "b").unwrap();
        assert_eq!(attr_b.nodes.len(), 2);
        assert!((attr_b.concept_names["c2"] - (1.0 - (1.0 - 0.2) * (1.0 - 0.2))).abs() < 1e-12);
        assert!((attr_b.confidence - 0.36).abs() < 1e-12);
        assert_eq!(concept.best_concept_name(), "c1");
    }

    #[test]
    fn naming_priority_is_maximum_of_nodes() {
        let mut ontology = Ontology::new();
        ontology
            .create_event_type("a")
            .create_property("host", "computer.name")
            .identifies("computer", 10)
            .set_naming_priority(50);
        ontology
            .create_event_type("b")
            .create_property("host", "computer.name")
            .identifies("computer", 10)
            .set_naming_priority(200);
        let mut graph = build(
            ontology,
            &[
                Event::new("a").with_value("host", "pc1"),
                Event::new("b").with_value("host", "pc1"),
            ],
        );
        let concept = mine_concept(&mut graph, "obj:0:host:computer:pc1", 0.1);
        assert_eq!(concept.attributes.len(), 1);
        assert_eq!(concept.attributes[0].concept_naming_priority, 200);
        assert_eq!(concept.attributes[0].name, "computer.name:");
    }

    #[test]
    fn related_concepts_follow_inter_relations() {
        let mut ontology = Ontology::new();
        let login = ontology.create_event_type("login");
        login.create_property("user", "user.name").identifies("account", 9);
        login.create_property("host", "computer.name").identifies("computer", 8);
        login.relate_inter("user", "host", 7);
        let mut graph = build(
            ontology,
            &[Event::new("login").with_value("user", "alice").with_value("host", "pc1")],
        );

        graph.mine(None, &MiningConfig::default()).unwrap();
        let result = graph.extract_result_set().unwrap();
        assert_eq!(result.len(), 2);

        let user = result.get("obj:0:user:account:alice").unwrap();
        let host = result.get("obj:0:host:computer:pc1").unwrap();
        assert_eq!(user.attributes.len(), 1);
        assert!((user.related["obj:0:host:computer:pc1"] - 0.9 * 0.7 * 0.8).abs() < 1e-12);
        assert!((host.related["obj:0:user:account:alice"] - 0.8 * 0.7 * 0.9).abs() < 1e-12);
        assert_eq!(user.to_string(), "account: alice");
    }

    #[test]
    fn unmined_seed_is_missing() {
        let mut graph = shared_value("c1", "c2");
        assert!(matches!(
            graph.extract_instance("obj:0:a:c1:value"),
            Err(MinerError::Graph(GraphError::SeedMissing { .. }))
        ));
        graph.mine(None, &MiningConfig::default()).unwrap();
        assert_eq!(graph.extract_result_set().unwrap().len(), 2);
        graph.reset();
        assert!(graph.extract_result_set().unwrap().is_empty());
    }
}
