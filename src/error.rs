//! Rich diagnostic error types for the concept miner.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so users know what went wrong and how
//! to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the miner.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum MinerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ResultSet(#[from] ResultError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Ontology errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OntologyError {
    #[error("unknown event type: {name}")]
    #[diagnostic(
        code(edxml::ontology::unknown_event_type),
        help(
            "The event refers to an event type that the ontology does not define. \
             Add the ontology that defines it before adding events of this type."
        )
    )]
    UnknownEventType { name: String },

    #[error("event type {event_type} has no property {property}")]
    #[diagnostic(
        code(edxml::ontology::unknown_property),
        help("A relation or event refers to a property that is not defined on its event type.")
    )]
    UnknownProperty { event_type: String, property: String },

    #[error("property {property} of event type {event_type} is not associated with concept {concept}")]
    #[diagnostic(
        code(edxml::ontology::unknown_concept_association),
        help(
            "Relations between concepts must refer to concepts that their source and \
             target properties are associated with. Add the association with `identifies()`."
        )
    )]
    UnknownConceptAssociation {
        event_type: String,
        property: String,
        concept: String,
    },

    #[error("relation on property {property} of event type {event_type} does not name a concept")]
    #[diagnostic(
        code(edxml::ontology::ambiguous_concept),
        help(
            "The property has zero or several concept associations, so the concept \
             taking part in the relation must be named explicitly."
        )
    )]
    AmbiguousConcept { event_type: String, property: String },

    #[error("{what} has invalid confidence {value}, expected 1..=10")]
    #[diagnostic(
        code(edxml::ontology::invalid_confidence),
        help("Ontology confidences are authored on a scale from 1 (weak) to 10 (certain).")
    )]
    InvalidConfidence { what: String, value: u8 },

    #[error("failed to read ontology from {path}: {source}")]
    #[diagnostic(
        code(edxml::ontology::read),
        help("Check that the ontology file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ontology: {message}")]
    #[diagnostic(
        code(edxml::ontology::parse),
        help("Ontologies are read from TOML (.toml) or JSON (.json) files.")
    )]
    Parse { message: String },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node not found: {id}")]
    #[diagnostic(
        code(edxml::graph::node_not_found),
        help(
            "The node ID does not exist in the concept graph. \
             Node IDs are only valid for the graph that produced them."
        )
    )]
    NodeNotFound { id: String },

    #[error("node {id} cannot seed a concept instance")]
    #[diagnostic(
        code(edxml::graph::invalid_seed),
        help(
            "Only object value nodes that are associated with a concept can seed mining. \
             Object hubs are synthetic and carry no concept."
        )
    )]
    InvalidSeed { id: String },

    #[error("seed node {seed} missing in concept instance")]
    #[diagnostic(
        code(edxml::graph::seed_missing),
        help(
            "The seed of a mined concept instance must carry a confidence for itself. \
             This indicates that mining state was modified between mining and extraction; \
             reset the graph and mine again."
        )
    )]
    SeedMissing { seed: String },
}

// ---------------------------------------------------------------------------
// Result errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ResultError {
    #[error("serialization error: {message}")]
    #[diagnostic(
        code(edxml::result::serde),
        help(
            "Failed to serialize or deserialize mining results. \
             The JSON must have been produced by `to_json()` of a compatible version."
        )
    )]
    Serialization { message: String },

    #[error("unsupported knowledge base version: {version}")]
    #[diagnostic(
        code(edxml::result::version),
        help("Only knowledge base JSON version 1.0 is supported.")
    )]
    UnsupportedVersion { version: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    #[diagnostic(
        code(edxml::config::read),
        help("Check that the configuration file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    #[diagnostic(
        code(edxml::config::write),
        help("Check that the directory exists and is writable.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    #[diagnostic(
        code(edxml::config::parse),
        help("The configuration file must be valid TOML.")
    )]
    Parse { path: String, message: String },

    #[error("minimum confidence {value} out of range")]
    #[diagnostic(
        code(edxml::config::min_confidence),
        help("The minimum confidence is a probability and must lie in [0.0, 1.0).")
    )]
    InvalidThreshold { value: f64 },
}

/// Convenience alias for functions returning miner results.
pub type MinerResult<T> = std::result::Result<T, MinerError>;
