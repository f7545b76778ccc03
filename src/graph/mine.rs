//! Concept mining: confidence-thresholded propagation from seed nodes.
//!
//! A mining run starts at a seed node and walks the graph breadth-first over
//! simple paths. Path confidence is the product of the edge confidences along
//! the path. An edge is followed into the seed's concept instance when:
//!
//! - its target is a hub,
//! - it is an intra concept relation, or
//! - it is a same object inference and the target's concept is in scope,
//!   meaning it shares a branch with concepts evidenced so far, with enough
//!   confidence to stay above the threshold.
//!
//! Inter concept relations are never followed; they relate concept instances
//! to each other and are picked up during extraction.
//!
//! Runs are computed read-only into a run-local result and applied to the graph
//! afterwards, so runs for different seeds can be computed in parallel.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GraphError, MinerResult};
use crate::ontology::concept_names_share_branch;

use super::index::ConceptInstanceGraph;
use super::{EdgeIndex, Inference, NodeIndex, or_combine};

fn default_min_confidence() -> f64 {
    0.1
}

fn default_max_depth() -> usize {
    10
}

/// Parameters of a mining run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Paths with a confidence at or below this value are cut off.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Maximum number of hops from the seed.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Compute auto-seed runs in parallel.
    #[serde(default)]
    pub parallel: bool,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_depth: default_max_depth(),
            parallel: false,
        }
    }
}

impl MiningConfig {
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The threshold must lie in [0, 1); a threshold of 1 or more rejects everything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.min_confidence) {
            return Err(ConfigError::InvalidThreshold {
                value: self.min_confidence,
            });
        }
        Ok(())
    }
}

/// Bookkeeping of the best path that reached a node.
#[derive(Debug, Clone, Copy)]
struct Visit {
    taint: f64,
    depth: usize,
    reason: Option<EdgeIndex>,
}

/// A queued path end.
struct Frontier {
    node: NodeIndex,
    confidence: f64,
    depth: usize,
    path: Vec<NodeIndex>,
}

/// Outcome of mining one seed, computed without touching the graph.
struct SeedRun {
    seed_id: String,
    /// Combined confidence of every node reached.
    confidences: BTreeMap<NodeIndex, f64>,
    /// Concept name → node → combined confidence the node evidences it.
    evidence: BTreeMap<String, BTreeMap<NodeIndex, f64>>,
    visits: HashMap<NodeIndex, Visit>,
    /// (source node, edge) for every followed edge.
    conclusions: BTreeSet<(NodeIndex, EdgeIndex)>,
}

impl SeedRun {
    fn combine(&mut self, node: NodeIndex, confidence: f64) {
        let slot = self.confidences.entry(node).or_insert(0.0);
        *slot = or_combine([*slot, confidence]);
    }

    fn evidence_for(&mut self, concept: &str, node: NodeIndex, confidence: f64) {
        let slot = self
            .evidence
            .entry(concept.to_string())
            .or_default()
            .entry(node)
            .or_insert(0.0);
        *slot = or_combine([*slot, confidence]);
    }

    /// Probability that a node with the given concept belongs to the
    /// instance, judged by the concepts evidenced so far.
    fn scope(&self, concept: &str) -> f64 {
        or_combine(
            self.evidence
                .iter()
                .filter(|(name, _)| concept_names_share_branch(name, concept))
                .flat_map(|(_, nodes)| nodes.values().copied()),
        )
    }
}

impl ConceptInstanceGraph {
    /// Mine the concept instance of one seed, or of every object node when no
    /// seed is given.
    ///
    /// Annotations are added under the seed's own key, so runs for different
    /// seeds never overwrite each other. Mining the same seed twice without a
    /// reset replaces everything the earlier run recorded for that seed.
    /// Returns the mined seed IDs.
    pub fn mine(&mut self, seed: Option<&str>, config: &MiningConfig) -> MinerResult<Vec<String>> {
        config.validate()?;

        let seeds = match seed {
            Some(id) => {
                let idx = self
                    .find(id)
                    .ok_or_else(|| GraphError::NodeNotFound { id: id.to_string() })?;
                if self.graph[idx].is_hub() {
                    return Err(GraphError::InvalidSeed { id: id.to_string() }.into());
                }
                vec![idx]
            }
            None => self
                .nodes()
                .filter(|(_, node)| !node.is_hub())
                .map(|(idx, _)| idx)
                .collect(),
        };

        let graph = &*self;
        let runs: Vec<SeedRun> = if config.parallel && seeds.len() > 1 {
            seeds.par_iter().map(|&s| graph.run_seed(s, config)).collect()
        } else {
            seeds.iter().map(|&s| graph.run_seed(s, config)).collect()
        };

        let mut mined = Vec::with_capacity(runs.len());
        for run in runs {
            tracing::debug!(
                seed = %run.seed_id,
                nodes = run.confidences.len(),
                concepts = run.evidence.len(),
                "seed mined"
            );
            mined.push(run.seed_id.clone());
            self.apply(run);
        }

        tracing::info!(
            seeds = mined.len(),
            min_confidence = config.min_confidence,
            parallel = config.parallel,
            "concept mining complete"
        );
        Ok(mined)
    }

    fn run_seed(&self, seed: NodeIndex, config: &MiningConfig) -> SeedRun {
        let seed_node = &self.graph[seed];
        let mut run = SeedRun {
            seed_id: seed_node.id.clone(),
            confidences: BTreeMap::new(),
            evidence: BTreeMap::new(),
            visits: HashMap::new(),
            conclusions: BTreeSet::new(),
        };

        run.confidences.insert(seed, seed_node.confidence);
        if let Some(concept) = seed_node.concept_name() {
            run.evidence_for(concept, seed, seed_node.confidence);
        }
        run.visits.insert(
            seed,
            Visit {
                taint: seed_node.confidence,
                depth: 0,
                reason: None,
            },
        );

        let mut queue = VecDeque::new();
        queue.push_back(Frontier {
            node: seed,
            confidence: seed_node.confidence,
            depth: 0,
            path: vec![seed],
        });

        while let Some(current) = queue.pop_front() {
            if current.depth >= config.max_depth {
                continue;
            }

            for (edge, target, inference) in self.outgoing_sorted(current.node) {
                if current.path.contains(&target) {
                    continue;
                }
                let propagated = current.confidence * inference.confidence;
                if propagated <= config.min_confidence {
                    continue;
                }
                if !self.same_concept(&run, inference, target, propagated, config.min_confidence) {
                    continue;
                }

                run.combine(target, propagated);
                if let Some(concept) = self.graph[target].concept_name() {
                    run.evidence_for(concept, target, propagated);
                }
                run.conclusions.insert((current.node, edge));

                let improved = run.visits.get(&target).is_none_or(|v| propagated > v.taint);
                if improved {
                    run.visits.insert(
                        target,
                        Visit {
                            taint: propagated,
                            depth: current.depth + 1,
                            reason: Some(edge),
                        },
                    );
                    let mut path = current.path.clone();
                    path.push(target);
                    queue.push_back(Frontier {
                        node: target,
                        confidence: propagated,
                        depth: current.depth + 1,
                        path,
                    });
                }
            }
        }

        run
    }

    /// Whether following the edge keeps reasoning about the seed's concept instance.
    fn same_concept(
        &self,
        run: &SeedRun,
        inference: &Inference,
        target: NodeIndex,
        propagated: f64,
        min_confidence: f64,
    ) -> bool {
        let Some(concept) = self.graph[target].concept_name() else {
            // Hubs carry no concept, jumping to one never changes the concept.
            return true;
        };
        if inference.is_same_object() {
            return run.scope(concept) * propagated > min_confidence;
        }
        inference.is_intra()
    }

    fn apply(&mut self, run: SeedRun) {
        let seed_id = run.seed_id;
        if self.mined_seeds.contains(&seed_id) {
            self.forget_seed(&seed_id);
        }

        for (&idx, &confidence) in &run.confidences {
            let state = &mut self.graph[idx].state;
            state.seed_confidences.insert(seed_id.clone(), confidence);
            state.visited = true;
            if let Some(visit) = run.visits.get(&idx) {
                if visit.taint >= state.taint {
                    state.taint = visit.taint;
                    state.depth = visit.depth;
                    state.reason = visit.reason;
                }
            }
        }

        for (concept, nodes) in &run.evidence {
            for (&idx, &confidence) in nodes {
                self.graph[idx]
                    .state
                    .concept_name_equivalents
                    .entry(concept.clone())
                    .or_default()
                    .insert(seed_id.clone(), confidence);
            }
        }

        for &(source, edge) in &run.conclusions {
            self.graph[source].state.conclusions.insert(edge);
            self.graph[edge].seeds.insert(seed_id.clone());
        }

        self.mined_seeds.insert(seed_id);
    }

    /// Drop the annotations an earlier run left under `seed_id`. Conclusions
    /// no other seed supports are dropped with them.
    fn forget_seed(&mut self, seed_id: &str) {
        for inference in self.graph.edge_weights_mut() {
            inference.seeds.remove(seed_id);
        }
        let unsupported: BTreeSet<EdgeIndex> = self
            .graph
            .edge_indices()
            .filter(|&edge| self.graph[edge].seeds.is_empty())
            .collect();

        for node in self.graph.node_weights_mut() {
            let state = &mut node.state;
            state.seed_confidences.remove(seed_id);
            state.concept_name_equivalents.retain(|_, seeds| {
                seeds.remove(seed_id);
                !seeds.is_empty()
            });
            state.conclusions.retain(|edge| !unsupported.contains(edge));
            state.visited = !state.seed_confidences.is_empty();
        }
        self.mined_seeds.remove(seed_id);
        tracing::debug!(seed = %seed_id, "earlier run discarded");
    }
}
