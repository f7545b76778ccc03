//! In-memory concept graph arena.
//!
//! Uses a `petgraph` stable graph for the node/edge arena, a `HashMap` for
//! lookups by node ID and a value index joining all occurrences of the same
//! object value to one hub.

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;

use crate::ontology::PropertyRelation;

use super::{EdgeIndex, Inference, Node, NodeIndex};

/// Object type name and object value, identifying one hub.
type ValueKey = (String, String);

/// Concept graph built from events and mined for concept instances.
///
/// Nodes are owned by the arena; edges refer to their endpoints by index.
/// Every edge is created together with its reverse, so mining can start at
/// any node.
pub struct ConceptInstanceGraph {
    pub(crate) graph: StableDiGraph<Node, Inference>,
    /// Node ID → NodeIndex for O(1) lookups.
    node_index: HashMap<String, NodeIndex>,
    /// All event object nodes per object value, in insertion order.
    occurrences: HashMap<ValueKey, Vec<NodeIndex>>,
    /// Hub per object value occurring more than once.
    hubs: HashMap<ValueKey, NodeIndex>,
    /// Seeds mined since the last reset.
    pub(crate) mined_seeds: BTreeSet<String>,
}

impl ConceptInstanceGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            node_index: HashMap::new(),
            occurrences: HashMap::new(),
            hubs: HashMap::new(),
            mined_seeds: BTreeSet::new(),
        }
    }

    /// Add an event object node, returning its index.
    ///
    /// When a node with the same ID exists, that node is returned instead, so
    /// relations fan in to a shared node. The second occurrence of an object
    /// value creates the hub for it; later occurrences join the existing hub.
    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&node.id) {
            return idx;
        }

        let id = node.id.clone();
        let key = (node.object_type.clone(), node.value.clone());
        let is_hub = node.is_hub();
        let idx = self.graph.add_node(node);
        self.node_index.insert(id, idx);
        if is_hub {
            return idx;
        }

        let occurrences = self.occurrences.entry(key.clone()).or_default();
        occurrences.push(idx);
        if occurrences.len() > 1 {
            if let Some(hub) = self.hubs.get(&key).copied() {
                self.link_hub(hub, idx);
            } else {
                self.create_hub(key);
            }
        }
        idx
    }

    /// Link two nodes by a property relation, in both directions.
    ///
    /// Linking a node to itself is a no-op.
    pub fn link_relation(&mut self, source: NodeIndex, target: NodeIndex, relation: &PropertyRelation) {
        if source == target {
            return;
        }
        self.graph.add_edge(source, target, Inference::relation(relation));
        self.graph
            .add_edge(target, source, Inference::relation(&relation.reversed()));
    }

    fn create_hub(&mut self, key: ValueKey) {
        let hub = self.graph.add_node(Node::hub(&key.0, &key.1));
        self.node_index.insert(self.graph[hub].id.clone(), hub);
        let occurrences = self.occurrences.get(&key).cloned().unwrap_or_default();
        self.hubs.insert(key, hub);
        for node in occurrences {
            self.link_hub(hub, node);
        }
    }

    /// Join an object node to its hub. Observing the value is lossless; going
    /// from the hub to the node is discounted by the node's concept confidence.
    fn link_hub(&mut self, hub: NodeIndex, node: NodeIndex) {
        let Some(object) = self.graph[node].as_event_object() else {
            return;
        };
        let discount = object.concept_confidence;
        self.graph.add_edge(node, hub, Inference::same_object(1.0));
        self.graph.add_edge(hub, node, Inference::same_object(discount));
    }

    /// Clear all mining state so the graph can be mined again from scratch.
    ///
    /// Node annotations and edge seed memberships are cleared. Hubs are pruned
    /// together with their edges and rebuilt from the value index.
    pub fn reset(&mut self) {
        let nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        for idx in nodes {
            if let Some(node) = self.graph.node_weight_mut(idx) {
                node.reset();
            }
        }
        let edges: Vec<EdgeIndex> = self.graph.edge_indices().collect();
        for idx in edges {
            if let Some(edge) = self.graph.edge_weight_mut(idx) {
                edge.seeds.clear();
            }
        }

        let pruned = self.hubs.len();
        for (_, hub) in self.hubs.drain() {
            if let Some(node) = self.graph.remove_node(hub) {
                self.node_index.remove(&node.id);
            }
        }

        let mut shared: Vec<ValueKey> = self
            .occurrences
            .iter()
            .filter(|(_, nodes)| nodes.len() > 1)
            .map(|(key, _)| key.clone())
            .collect();
        shared.sort();
        for key in shared {
            self.create_hub(key);
        }

        self.mined_seeds.clear();
        tracing::debug!(
            nodes = self.graph.node_count(),
            hubs_rebuilt = self.hubs.len(),
            hubs_pruned = pruned,
            "concept graph reset"
        );
    }

    /// Look up a node index by node ID.
    pub fn find(&self, id: &str) -> Option<NodeIndex> {
        self.node_index.get(id).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(idx)
    }

    /// Look up a node by node ID.
    pub fn node_by_id(&self, id: &str) -> Option<&Node> {
        self.find(id).and_then(|idx| self.node(idx))
    }

    pub fn edge(&self, idx: EdgeIndex) -> Option<&Inference> {
        self.graph.edge_weight(idx)
    }

    /// Source and target of an edge.
    pub fn endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    /// All nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).map(|node| (idx, node)))
    }

    /// Outgoing edges of a node as (edge, target, inference).
    pub fn outgoing(&self, idx: NodeIndex) -> impl Iterator<Item = (EdgeIndex, NodeIndex, &Inference)> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), e.weight()))
    }

    /// Outgoing edges in a canonical order: by target node ID, then relation
    /// edges before same object edges.
    ///
    /// Edge insertion order depends on the order events were added and on
    /// hub rebuilds; sorting keeps mining independent of both.
    pub fn outgoing_sorted(&self, idx: NodeIndex) -> Vec<(EdgeIndex, NodeIndex, &Inference)> {
        let mut edges: Vec<_> = self.outgoing(idx).collect();
        edges.sort_by(|a, b| {
            self.graph[a.1]
                .id
                .cmp(&self.graph[b.1].id)
                .then(a.2.is_same_object().cmp(&b.2.is_same_object()))
        });
        edges
    }

    /// Hub of an object value, if the value occurs more than once.
    pub fn hub_for(&self, object_type: &str, value: &str) -> Option<NodeIndex> {
        self.hubs
            .get(&(object_type.to_string(), value.to_string()))
            .copied()
    }

    /// IDs of the seeds mined since the last reset.
    pub fn mined_seeds(&self) -> &BTreeSet<String> {
        &self.mined_seeds
    }

    /// Number of nodes, hubs included.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn hub_count(&self) -> usize {
        self.hubs.len()
    }
}

impl Default for ConceptInstanceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConceptInstanceGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptInstanceGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .field("hubs", &self.hub_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::{ConceptAssociation, RelationKind};

    fn object(event: &str, property: &str, concept: &str, value: &str) -> Node {
        Node::event_object(event, property, concept, &ConceptAssociation::new(8), "a", value)
    }

    #[test]
    fn identity_collision_returns_same_node() {
        let mut graph = ConceptInstanceGraph::new();
        let a = graph.add_node(object("e1", "p1", "c1", "v"));
        let b = graph.add_node(object("e1", "p1", "c1", "v"));
        assert_eq!(a, b);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.hub_count(), 0);
    }

    #[test]
    fn same_value_under_other_concept_is_distinct() {
        let mut graph = ConceptInstanceGraph::new();
        let a = graph.add_node(object("e1", "p1", "c1", "v"));
        let b = graph.add_node(object("e1", "p1", "c2", "v"));
        assert_ne!(a, b);
        // Both occurrences share a value, which creates a hub.
        assert_eq!(graph.hub_count(), 1);
    }

    #[test]
    fn hub_created_on_first_reuse() {
        let mut graph = ConceptInstanceGraph::new();
        let a = graph.add_node(object("e1", "p1", "c1", "v"));
        assert!(graph.hub_for("a", "v").is_none());

        let b = graph.add_node(object("e2", "p1", "c1", "v"));
        let hub = graph.hub_for("a", "v").unwrap();
        assert_eq!(graph.node(hub).unwrap().id, "hub:a:v");
        assert_eq!(graph.edge_count(), 4);

        let c = graph.add_node(object("e3", "p1", "c1", "v"));
        assert_eq!(graph.hub_count(), 1);
        assert_eq!(graph.edge_count(), 6);

        for node in [a, b, c] {
            let (_, target, to_hub) = graph.outgoing(node).next().unwrap();
            assert_eq!(target, hub);
            assert_eq!(to_hub.confidence, 1.0);
        }
        for (_, _, from_hub) in graph.outgoing(hub) {
            assert!(from_hub.is_same_object());
            assert!((from_hub.confidence - 0.8).abs() < 1e-12);
        }
    }

    #[test]
    fn relations_link_both_directions() {
        let mut graph = ConceptInstanceGraph::new();
        let a = graph.add_node(object("e1", "p1", "c1", "x"));
        let b = graph.add_node(object("e1", "p2", "c2", "y"));
        let relation = PropertyRelation::new("p1", "p2", RelationKind::Intra).with_confidence(3);

        graph.link_relation(a, b, &relation);
        graph.link_relation(a, a, &relation);

        assert_eq!(graph.edge_count(), 2);
        let (edge, target, forward) = graph.outgoing(a).next().unwrap();
        assert_eq!(target, b);
        assert!(forward.is_intra());
        assert_eq!(graph.endpoints(edge), Some((a, b)));
        let (_, back, _) = graph.outgoing(b).next().unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn reset_rebuilds_hubs_and_clears_state() {
        let mut graph = ConceptInstanceGraph::new();
        let a = graph.add_node(object("e1", "p1", "c1", "v"));
        graph.add_node(object("e2", "p1", "c1", "v"));

        graph.graph[a].state.seed_confidences.insert("s".into(), 0.4);
        graph.graph[a].state.visited = true;
        let edges: Vec<EdgeIndex> = graph.graph.edge_indices().collect();
        for idx in &edges {
            graph.graph[*idx].seeds.insert("s".into());
        }
        graph.mined_seeds.insert("s".into());

        graph.reset();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.hub_count(), 1);
        assert!(graph.node_by_id(&Node::hub_id("a", "v")).is_some());
        assert!(graph.mined_seeds().is_empty());
        assert_eq!(graph.node(a).unwrap().seed_confidence("s"), 0.0);
        assert!(!graph.node(a).unwrap().state.visited);
        for idx in graph.graph.edge_indices() {
            assert!(graph.graph[idx].seeds.is_empty());
        }
        let rebuilt = graph.hub_for("a", "v").unwrap();
        assert!(graph.node(rebuilt).unwrap().is_hub());
    }

    #[test]
    fn canonical_edge_order() {
        let mut graph = ConceptInstanceGraph::new();
        let a = graph.add_node(object("e1", "p1", "c1", "x"));
        let z = graph.add_node(object("e1", "p3", "c1", "z"));
        let b = graph.add_node(object("e1", "p2", "c1", "y"));
        let relation = PropertyRelation::new("p1", "p2", RelationKind::Intra);
        graph.link_relation(a, z, &relation);
        graph.link_relation(a, b, &relation);

        let targets: Vec<NodeIndex> = graph.outgoing_sorted(a).into_iter().map(|e| e.1).collect();
        assert_eq!(targets, vec![b, z]);
    }
}
