// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # edxml-miner
//!
//! Concept mining for EDXML events: discovers which object values, across many
//! events, jointly describe one real-world entity, and how confident we can be
//! about each such assertion.
//!
//! ## Architecture
//!
//! - **Ontology** (`ontology`): immutable snapshot of event types, concept
//!   associations and property relations
//! - **Concept graph** (`graph`): object value nodes and hubs in a petgraph
//!   arena, built per event by `graph::construct`
//! - **Mining** (`graph::mine`): confidence-thresholded propagation from seeds,
//!   respecting the concept hierarchy
//! - **Results** (`result`): serializable concept instances with attributes,
//!   titles and related instances
//! - **Knowledge base** (`knowledge`): mining plus universals gathered from
//!   name, description and container relations
//!
//! ## Library usage
//!
//! ```no_run
//! use edxml_miner::event::Event;
//! use edxml_miner::graph::mine::MiningConfig;
//! use edxml_miner::knowledge::KnowledgeBase;
//! use edxml_miner::ontology::Ontology;
//!
//! let mut ontology = Ontology::new();
//! let login = ontology.create_event_type("login");
//! login.create_property("user", "user.name").identifies("account", 9);
//! login.create_property("host", "computer.name").identifies("computer", 8);
//! login.relate_inter("user", "host", 7);
//!
//! let mut kb = KnowledgeBase::new();
//! kb.add_ontology(&ontology).unwrap();
//! kb.add_event(&Event::new("login").with_value("user", "alice").with_value("host", "pc1"))
//!     .unwrap();
//! for concept in kb.mine(None, &MiningConfig::default()).unwrap().iter() {
//!     println!("{concept}");
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod knowledge;
pub mod ontology;
pub mod result;
