//! Graph construction: translates events into concept graph nodes and edges.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::MinerResult;
use crate::event::Event;
use crate::ontology::{EventType, Ontology, PropertyRelation};

use super::index::ConceptInstanceGraph;
use super::{Node, NodeIndex};

/// Expands a [`ConceptInstanceGraph`] one event at a time, using the ontology
/// snapshot to find concept associations and concept relations.
#[derive(Debug, Clone)]
pub struct GraphConstructor {
    ontology: Arc<Ontology>,
    events_added: u64,
}

impl GraphConstructor {
    pub fn new(ontology: Arc<Ontology>) -> Self {
        Self {
            ontology,
            events_added: 0,
        }
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    /// Number of events added so far. Also the ID of the next event.
    pub fn events_added(&self) -> u64 {
        self.events_added
    }

    /// Replace the ontology snapshot used for events added from now on.
    pub fn update_ontology(&mut self, ontology: Arc<Ontology>) {
        self.ontology = ontology;
    }

    /// Expand the graph with the object values of one event.
    ///
    /// Every inter / intra relation whose properties both have values in the
    /// event links each source value node to each target value node. Values of
    /// properties outside any concept relation get unlinked nodes, one per
    /// concept association. Each call assigns the next sequential event ID, so
    /// adding an identical event again adds new nodes joined through hubs.
    pub fn add(&mut self, graph: &mut ConceptInstanceGraph, event: &Event) -> MinerResult<()> {
        let event_type = self.ontology.event_type(&event.event_type)?;
        let event_id = self.events_added.to_string();

        let mut relation_properties = BTreeSet::new();
        let mut links = 0usize;
        for relation in event_type.relations.iter().filter(|r| r.kind.is_concept_relation()) {
            relation_properties.insert(relation.source.as_str());
            relation_properties.insert(relation.target.as_str());
            links += add_relation_nodes(graph, &event.event_type, event_type, relation, event, &event_id)?;
        }

        for (property_name, property) in &event_type.properties {
            if relation_properties.contains(property_name.as_str()) {
                continue;
            }
            for (concept, association) in &property.concepts {
                for value in event.values(property_name) {
                    graph.add_node(Node::event_object(
                        &event_id,
                        property_name,
                        concept,
                        association,
                        &property.object_type,
                        value,
                    ));
                }
            }
        }

        tracing::trace!(
            event = %event_id,
            event_type = %event.event_type,
            links,
            nodes = graph.node_count(),
            "event added to concept graph"
        );
        self.events_added += 1;
        Ok(())
    }
}

/// Add the nodes of one concept relation and link every source node to every
/// target node. Returns the number of linked pairs.
fn add_relation_nodes(
    graph: &mut ConceptInstanceGraph,
    event_type_name: &str,
    event_type: &EventType,
    relation: &PropertyRelation,
    event: &Event,
    event_id: &str,
) -> MinerResult<usize> {
    if !event.has_values(&relation.source) || !event.has_values(&relation.target) {
        return Ok(0);
    }

    let source = relation_nodes(
        graph,
        (event_type_name, event_type),
        &relation.source,
        relation.source_concept.as_deref(),
        event,
        event_id,
    )?;
    let target = relation_nodes(
        graph,
        (event_type_name, event_type),
        &relation.target,
        relation.target_concept.as_deref(),
        event,
        event_id,
    )?;

    for &s in &source {
        for &t in &target {
            graph.link_relation(s, t, relation);
        }
    }
    Ok(source.len() * target.len())
}

fn relation_nodes(
    graph: &mut ConceptInstanceGraph,
    (event_type_name, event_type): (&str, &EventType),
    property_name: &str,
    concept: Option<&str>,
    event: &Event,
    event_id: &str,
) -> MinerResult<Vec<NodeIndex>> {
    let (concept, association) = event_type.relation_concept(event_type_name, property_name, concept)?;
    let property = event_type.property(event_type_name, property_name)?;
    Ok(event
        .values(property_name)
        .map(|value| {
            graph.add_node(Node::event_object(
                event_id,
                property_name,
                concept,
                association,
                &property.object_type,
                value,
            ))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MinerError, OntologyError};

    fn login_ontology() -> Arc<Ontology> {
        let mut ontology = Ontology::new();
        let login = ontology.create_event_type("login");
        login.create_property("user", "user.name").identifies("account", 9);
        login.create_property("host", "computer.name").identifies("computer", 8);
        login.create_property("ip", "ip").identifies("computer", 5);
        login.create_property("comment", "text");
        login.relate_inter("user", "host", 7).set_predicate("logged in on");
        Arc::new(ontology)
    }

    #[test]
    fn relation_values_are_linked_pairwise() {
        let mut graph = ConceptInstanceGraph::new();
        let mut constructor = GraphConstructor::new(login_ontology());
        let event = Event::new("login")
            .with_value("user", "alice")
            .with_value("user", "bob")
            .with_value("host", "pc1")
            .with_value("comment", "hello");

        constructor.add(&mut graph, &event).unwrap();

        // Three relation nodes, no node for the unassociated property.
        assert_eq!(graph.node_count(), 3);
        // Two pairs, both directions.
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.hub_count(), 0);
        let alice = graph.node_by_id("obj:0:user:account:alice").unwrap();
        assert!((alice.confidence - 0.9).abs() < 1e-12);
        assert_eq!(constructor.events_added(), 1);
    }

    #[test]
    fn unrelated_associated_properties_get_standalone_nodes() {
        let mut graph = ConceptInstanceGraph::new();
        let mut constructor = GraphConstructor::new(login_ontology());
        let event = Event::new("login").with_value("ip", "10.0.0.1").with_value("user", "alice");

        constructor.add(&mut graph, &event).unwrap();

        // The relation lacks a host value: only the ip node is created.
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.node_by_id("obj:0:ip:computer:10.0.0.1").is_some());
    }

    #[test]
    fn repeated_values_join_through_hubs() {
        let mut graph = ConceptInstanceGraph::new();
        let mut constructor = GraphConstructor::new(login_ontology());
        let event = Event::new("login").with_value("user", "alice").with_value("host", "pc1");

        constructor.add(&mut graph, &event).unwrap();
        constructor.add(&mut graph, &event).unwrap();

        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.hub_count(), 2);
        // Two relation pairs plus four hub pairs.
        assert_eq!(graph.edge_count(), 12);
        assert!(graph.hub_for("user.name", "alice").is_some());

        // Identical events still get their own sequential IDs.
        assert_eq!(constructor.events_added(), 2);
        for (id, event_id) in [("obj:0:user:account:alice", "0"), ("obj:1:user:account:alice", "1")] {
            let node = graph.node_by_id(id).unwrap();
            assert_eq!(node.as_event_object().unwrap().event_id, event_id);
        }
    }

    #[test]
    fn unknown_event_type_fails_fast() {
        let mut graph = ConceptInstanceGraph::new();
        let mut constructor = GraphConstructor::new(login_ontology());
        let result = constructor.add(&mut graph, &Event::new("logout"));
        assert!(matches!(
            result,
            Err(MinerError::Ontology(OntologyError::UnknownEventType { .. }))
        ));
        assert_eq!(constructor.events_added(), 0);
    }

    #[test]
    fn ontology_update_applies_to_later_events() {
        let mut graph = ConceptInstanceGraph::new();
        let mut constructor = GraphConstructor::new(Arc::new(Ontology::new()));
        let event = Event::new("login").with_value("ip", "10.0.0.1");
        assert!(constructor.add(&mut graph, &event).is_err());

        constructor.update_ontology(login_ontology());
        constructor.add(&mut graph, &event).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert!(constructor.ontology().event_type("login").is_ok());
    }
}
