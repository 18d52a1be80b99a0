//! Crossover between two parent graphs.
//!
//! A child is sized to the larger parent in every partition and then picks
//! up each parent connection independently with that parent's inclusion
//! rate. Parallel edges are kept as-is; nothing is deduplicated.
//!
//! Parent endpoints are translated partition by partition: input `i` of a
//! parent becomes input `i` of the child, output `j` becomes output `j` and
//! hidden node `k` becomes hidden node `k`. Since the child is at least as
//! large as either parent in each partition, every inherited endpoint exists
//! in the child. Disconnected parent connections are never inherited.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::Graph;
use crate::node::NodeId;
use crate::signal::Signal;

/// Parameters for [`Graph::inherit`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InheritConfig {
    /// Probability of keeping each connection of the first parent.
    pub rate_a: f64,
    /// Probability of keeping each connection of the second parent.
    pub rate_b: f64,
    /// Carry over buffer contents and active-buffer state ("memory").
    /// Otherwise inherited connections start with empty buffers.
    pub inherit_memory: bool,
}

impl Default for InheritConfig {
    fn default() -> Self {
        Self {
            rate_a: 0.7,
            rate_b: 0.3,
            inherit_memory: false,
        }
    }
}

impl InheritConfig {
    /// Keep each connection of either parent with the same probability.
    #[must_use]
    pub fn uniform(rate: f64) -> Self {
        Self {
            rate_a: rate,
            rate_b: rate,
            ..Default::default()
        }
    }

    /// Also carry over buffer state.
    #[must_use]
    pub const fn with_memory(mut self) -> Self {
        self.inherit_memory = true;
        self
    }
}

/// Hook for mutation operators driven by an outer evolution loop.
///
/// The crate ships no operator; implement this to plug weight perturbation,
/// node insertion or rewiring into [`Graph::mutate`].
pub trait Mutate<T: Signal> {
    /// Apply one mutation pass to `graph`.
    fn mutate<R: Rng + ?Sized>(&self, graph: &mut Graph<T>, rng: &mut R);
}

impl<T: Signal> Graph<T> {
    /// Build a child graph from two parents.
    ///
    /// The child takes the larger of the two parents' input, output and
    /// hidden counts and the first parent's [`GraphConfig`](crate::GraphConfig).
    /// Every connection of `parent_a` is kept with probability
    /// `settings.rate_a`, every connection of `parent_b` with probability
    /// `settings.rate_b`, so the expected connection count is
    /// `rate_a * |A| + rate_b * |B|` for parents without disconnected edges.
    #[must_use]
    pub fn inherit<R: Rng + ?Sized>(
        parent_a: &Self,
        parent_b: &Self,
        settings: &InheritConfig,
        rng: &mut R,
    ) -> Self {
        let inputs = parent_a.input_count().max(parent_b.input_count());
        let outputs = parent_a.output_count().max(parent_b.output_count());
        let hidden = parent_a.hidden_count().max(parent_b.hidden_count());

        let mut child = Self::with_config(inputs, outputs, *parent_a.config());
        child.add_hidden_nodes(hidden);

        let memory = settings.inherit_memory;
        let from_a = child.inherit_connections(parent_a, settings.rate_a, memory, rng);
        let from_b = child.inherit_connections(parent_b, settings.rate_b, memory, rng);

        debug!(
            inputs,
            outputs,
            hidden,
            from_a,
            from_b,
            memory,
            "inherited child graph"
        );
        child
    }

    fn inherit_connections<R: Rng + ?Sized>(
        &mut self,
        parent: &Self,
        rate: f64,
        memory: bool,
        rng: &mut R,
    ) -> usize {
        let mut inherited = 0;
        for conn in parent.connections() {
            let (Some(source), Some(target)) = (conn.source(), conn.target()) else {
                continue;
            };
            if rng.random::<f64>() >= rate {
                continue;
            }

            let base = if memory {
                conn.clone()
            } else {
                conn.without_memory()
            };
            let source = self.translate_from(parent, source);
            let target = self.translate_from(parent, target);
            self.insert_connection(base.with_endpoints(source, target));
            inherited += 1;
        }
        inherited
    }

    /// Map a node id of `parent` to the node at the same position of the
    /// same partition in `self`.
    fn translate_from(&self, parent: &Self, id: NodeId) -> NodeId {
        let index = id.index();
        let parent_io = parent.input_count() + parent.output_count();
        let child_index = if index < parent.input_count() {
            index
        } else if index < parent_io {
            self.input_count() + (index - parent.input_count())
        } else {
            self.input_count() + self.output_count() + (index - parent_io)
        };
        self.node_id(child_index)
    }

    /// Apply a mutation operator.
    pub fn mutate<M: Mutate<T>, R: Rng + ?Sized>(&mut self, mutator: &M, rng: &mut R) {
        mutator.mutate(self, rng);
    }
}
