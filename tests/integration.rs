//! End-to-end integration tests for the concept miner.
//!
//! These tests exercise the full pipeline from an ontology file and JSON lines
//! events through graph construction, mining, extraction and persistence.

use std::collections::BTreeSet;
use std::sync::Arc;

use edxml_miner::event::Event;
use edxml_miner::graph::construct::GraphConstructor;
use edxml_miner::graph::index::ConceptInstanceGraph;
use edxml_miner::graph::mine::MiningConfig;
use edxml_miner::knowledge::KnowledgeBase;
use edxml_miner::ontology::Ontology;

const ONTOLOGY: &str = r#"
[event_types.login.properties.user]
object_type = "user.name"
concepts = { "account.user" = { confidence = 9, naming_priority = 200, attribute_extension = "login" } }

[event_types.login.properties.host]
object_type = "computer.name"
concepts = { computer = { confidence = 8, naming_priority = 192 } }

[event_types.login.properties.ip]
object_type = "ip"
concepts = { computer = { confidence = 6 } }

[[event_types.login.relations]]
source = "user"
target = "host"
kind = "inter"
predicate = "logged in on"
confidence = 7

[[event_types.login.relations]]
source = "host"
target = "ip"
kind = "intra"
predicate = "has address"
confidence = 8

[event_types.dhcp.properties.ip]
object_type = "ip"
concepts = { computer = { confidence = 7 } }

[event_types.dhcp.properties.mac]
object_type = "mac"
concepts = { "computer.device" = { confidence = 9 } }

[event_types.dhcp.properties.vendor]
object_type = "vendor"

[[event_types.dhcp.relations]]
source = "mac"
target = "ip"
kind = "intra"
confidence = 9

[[event_types.dhcp.relations]]
source = "vendor"
target = "mac"
kind = "description"
"#;

const EVENTS: &str = r#"
{"event_type":"login","properties":{"user":["alice"],"host":["pc1"],"ip":["10.0.0.1"]}}
{"event_type":"login","properties":{"user":["bob"],"host":["pc1"],"ip":["10.0.0.1"]}}

{"event_type":"dhcp","properties":{"ip":["10.0.0.1"],"mac":["aa:bb"],"vendor":["Acme"]}}
"#;

const HOST_SEED: &str = "obj:0:host:computer:pc1";
const ALICE_SEED: &str = "obj:0:user:account.user:alice";

fn events() -> Vec<Event> {
    EVENTS
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn knowledge_base() -> KnowledgeBase {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("ontology.toml");
    std::fs::write(&path, ONTOLOGY).unwrap();

    let mut kb = KnowledgeBase::new();
    kb.add_ontology(&Ontology::load(&path).unwrap()).unwrap();
    for event in events() {
        kb.add_event(&event).unwrap();
    }
    kb
}

fn fresh_graph() -> ConceptInstanceGraph {
    let ontology = Ontology::from_toml_str(ONTOLOGY).unwrap();
    let mut graph = ConceptInstanceGraph::new();
    let mut constructor = GraphConstructor::new(Arc::new(ontology));
    for event in events() {
        constructor.add(&mut graph, &event).unwrap();
    }
    graph
}

#[test]
fn seeded_mining_collects_computer() {
    let mut kb = knowledge_base();
    let concepts = kb.mine(Some(HOST_SEED), &MiningConfig::default()).unwrap();
    assert_eq!(concepts.len(), 1);

    let computer = concepts.get(HOST_SEED).unwrap();
    assert!(computer.has_attribute("computer.name:"));
    assert!(computer.has_attribute("ip:"));
    // Reached through the shared IP address and the DHCP intra relation.
    assert!(computer.has_attribute("mac:"));
    // Users are related, not part of the computer.
    assert!(!computer.has_attribute("user.name:login"));

    assert_eq!(computer.best_concept_name(), "computer");
    assert!(computer.concept_names().contains_key("computer.device"));
    assert_eq!(computer.title(), "pc1");
    assert_eq!(computer.to_string(), "computer: pc1");

    let host = computer.attributes_named("computer.name:").next().unwrap();
    assert_eq!(host.nodes.len(), 2);
    assert!(host.confidence > 0.8);
}

#[test]
fn auto_mining_is_complete() {
    let mut kb = knowledge_base();
    let concepts = kb.mine(None, &MiningConfig::default()).unwrap();
    // Three object nodes per login event, two for the DHCP event.
    assert_eq!(concepts.len(), 8);

    let alice = concepts.get(ALICE_SEED).unwrap();
    assert_eq!(alice.title(), "alice");
    assert_eq!(alice.best_concept_name(), "account.user");
    assert!(alice.related_concepts()[HOST_SEED] > 0.0);

    let accounts = kb.filter_concept("account.user");
    assert_eq!(accounts.concepts().len(), 2);
    assert_eq!(kb.filter_attribute("mac:").concepts().len(), 6);
}

#[test]
fn parallel_auto_mining_matches_sequential() {
    let mut sequential = knowledge_base();
    let mut parallel = knowledge_base();
    let a = sequential.mine(None, &MiningConfig::default()).unwrap().clone();
    let b = parallel
        .mine(None, &MiningConfig::default().with_parallel(true))
        .unwrap()
        .clone();
    assert_eq!(a, b);
}

#[test]
fn reset_makes_runs_independent() {
    let config = MiningConfig::default();

    let mut reused = fresh_graph();
    reused.mine(Some(ALICE_SEED), &config).unwrap();
    reused.reset();
    reused.mine(Some(HOST_SEED), &config).unwrap();
    let reused = reused.extract_result_set().unwrap();

    let mut fresh = fresh_graph();
    fresh.mine(Some(HOST_SEED), &config).unwrap();
    let fresh = fresh.extract_result_set().unwrap();

    assert_eq!(reused, fresh);
}

#[test]
fn lower_threshold_never_shrinks_instance() {
    let mut graph = fresh_graph();
    let attributes = |graph: &mut ConceptInstanceGraph, min_confidence: f64| -> BTreeSet<(String, String)> {
        graph.reset();
        graph
            .mine(Some(HOST_SEED), &MiningConfig::default().with_min_confidence(min_confidence))
            .unwrap();
        graph
            .extract_instance(HOST_SEED)
            .unwrap()
            .attributes
            .into_iter()
            .map(|a| (a.name, a.value))
            .collect()
    };

    let strict = attributes(&mut graph, 0.5);
    let loose = attributes(&mut graph, 0.1);
    assert!(strict.is_subset(&loose));
    assert!(strict.len() < loose.len());
}

#[test]
fn universals_from_description_relations() {
    let kb = knowledge_base();
    let descriptions = kb.descriptions_for("mac", "aa:bb").unwrap();
    assert!(descriptions["vendor"].contains("Acme"));
    assert!(kb.names_for("mac", "aa:bb").is_none());
}

#[test]
fn knowledge_base_persists_as_json() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("knowledge.json");

    let mut kb = knowledge_base();
    kb.mine(None, &MiningConfig::default()).unwrap();
    std::fs::write(&path, kb.to_json_pretty().unwrap()).unwrap();

    let loaded = KnowledgeBase::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded.universals(), kb.universals());
    assert_eq!(loaded.concepts().len(), kb.concepts().len());

    for original in kb.concepts().iter() {
        let restored = loaded.concepts().get(&original.id).unwrap();
        assert_eq!(restored.best_concept_name(), original.best_concept_name());
        assert_eq!(restored.title(), original.title());
        assert_eq!(restored.attributes.len(), original.attributes.len());
        for (a, b) in restored.attributes.iter().zip(&original.attributes) {
            assert_eq!((&a.name, &a.value), (&b.name, &b.value));
            assert!((a.confidence - b.confidence).abs() < 1e-12);
        }
        for (id, confidence) in original.related_concepts() {
            assert!((restored.related_concepts()[id] - confidence).abs() < 1e-12);
        }
    }
}
