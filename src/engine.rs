//! Parallel tick engine.
//!
//! A tick is split into two passes so that no worker ever needs mutable
//! access to memory another worker touches:
//!
//! 1. **Evaluate**: the node arena is cut into contiguous id ranges, one per
//!    worker. Each worker runs the activation rule of its nodes, reading only
//!    the readable side of the (shared, immutable) connection arena.
//! 2. **Write back**: the connection arena is cut the same way and every
//!    connection stores its source node's emission in its writable buffer.
//!
//! [`Executor::flip`] toggles every connection's active buffer using the same
//! partitioning. Because reads and writes always target opposite buffers,
//! the result of a tick does not depend on how nodes are grouped or ordered,
//! and the single-threaded path is bit-identical to the pooled one.
//!
//! Workers come from a [`rayon::ThreadPool`] built once per graph, the first
//! time a tick is dense enough to need more than one thread. Every call
//! blocks until all of its tasks have finished.

use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::node::Node;
use crate::signal::Signal;

/// Connection count per worker thread below which extra threads are not used.
pub const DEFAULT_DENSITY_THRESHOLD: usize = 100_000;

/// Maximum number of worker threads a graph may use.
///
/// Negative values request auto-detection: available hardware parallelism
/// minus one, floored at one. Zero is treated as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadCount(pub i32);

impl ThreadCount {
    /// Auto-detect from the host.
    pub const AUTO: Self = Self(-1);

    /// Always tick on the calling thread.
    pub const SINGLE: Self = Self(1);

    /// Resolve to a concrete thread count (always at least one).
    #[must_use]
    pub fn resolve(self) -> usize {
        match usize::try_from(self.0) {
            Ok(fixed) => fixed.max(1),
            Err(_) => std::thread::available_parallelism()
                .map_or(1, NonZeroUsize::get)
                .saturating_sub(1)
                .max(1),
        }
    }
}

impl Default for ThreadCount {
    fn default() -> Self {
        Self::AUTO
    }
}

/// Weighting function that places the boundaries between worker ranges.
///
/// Boundary `i` of `n` sits at `curve(i / n) * len`. A linear curve gives
/// equal-width ranges; a power curve with exponent above one makes early
/// ranges wider and late ranges narrower.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PartitionCurve {
    /// Equal-width ranges.
    #[default]
    Linear,
    /// `x^exponent`. Non-positive or non-finite exponents behave as linear.
    Power(f64),
}

impl PartitionCurve {
    /// Map a fraction in `[0, 1]` to a fraction in `[0, 1]`.
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Power(exponent) if exponent.is_finite() && exponent > 0.0 => x.powf(exponent),
            Self::Power(_) => x,
        }
    }

    /// Boundaries splitting `0..len` into `parts` contiguous ranges.
    ///
    /// Returns `parts + 1` non-decreasing values starting at `0` and ending
    /// at `len`; range `i` is `bounds[i]..bounds[i + 1]` and may be empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bounds(self, parts: usize, len: usize) -> Vec<usize> {
        let parts = parts.max(1);
        let mut bounds = Vec::with_capacity(parts + 1);
        bounds.push(0);

        let mut previous = 0;
        for i in 1..parts {
            let fraction = self.apply(i as f64 / parts as f64).clamp(0.0, 1.0);
            let bound = ((fraction * len as f64) as usize).clamp(previous, len);
            bounds.push(bound);
            previous = bound;
        }

        bounds.push(len);
        bounds
    }
}

/// Split `slice` at `bounds` into disjoint mutable chunks, skipping empty ones.
fn split_by_bounds<'a, E>(mut slice: &'a mut [E], bounds: &[usize]) -> Vec<&'a mut [E]> {
    let mut chunks = Vec::with_capacity(bounds.len().saturating_sub(1));
    let mut consumed = 0;

    for window in bounds.windows(2) {
        let (head, tail) = std::mem::take(&mut slice).split_at_mut(window[1] - consumed);
        consumed = window[1];
        slice = tail;
        if !head.is_empty() {
            chunks.push(head);
        }
    }

    chunks
}

fn evaluate_nodes<T: Signal>(nodes: &mut [Node<T>], connections: &[Connection<T>]) {
    for node in nodes {
        node.evaluate(connections);
    }
}

fn write_back<T: Signal>(connections: &mut [Connection<T>], nodes: &[Node<T>]) {
    for conn in connections {
        if let Some(value) = conn.source().and_then(|id| nodes[id.index()].emission()) {
            conn.write(value);
        }
    }
}

fn flip_all<T: Signal>(connections: &mut [Connection<T>]) {
    for conn in connections {
        conn.flip();
    }
}

/// Runs ticks and buffer flips for one graph.
#[derive(Debug, Clone)]
pub(crate) struct Executor {
    max_threads: usize,
    pool: OnceLock<Option<Arc<ThreadPool>>>,
}

impl Executor {
    pub(crate) fn new(threads: ThreadCount) -> Self {
        Self {
            max_threads: threads.resolve(),
            pool: OnceLock::new(),
        }
    }

    pub(crate) const fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Threads to use for a graph with `connections` edges.
    ///
    /// One thread per `density_threshold` connections, at least one, at most
    /// the configured maximum.
    pub(crate) fn thread_count(&self, connections: usize, density_threshold: usize) -> usize {
        (connections / density_threshold.max(1)).clamp(1, self.max_threads)
    }

    fn pool(&self) -> Option<&ThreadPool> {
        self.pool
            .get_or_init(|| {
                match ThreadPoolBuilder::new()
                    .num_threads(self.max_threads)
                    .thread_name(|i| format!("gnn-tick-{i}"))
                    .build()
                {
                    Ok(pool) => {
                        debug!(threads = self.max_threads, "built tick worker pool");
                        Some(Arc::new(pool))
                    }
                    Err(err) => {
                        warn!(%err, "could not build tick worker pool, ticking inline");
                        None
                    }
                }
            })
            .as_deref()
    }

    /// Evaluate every node, then write each emission into the writable buffer
    /// of the node's outgoing connections.
    pub(crate) fn run<T: Signal>(
        &self,
        nodes: &mut [Node<T>],
        connections: &mut [Connection<T>],
        threads: usize,
        curve: PartitionCurve,
    ) {
        let pool = if threads > 1 { self.pool() } else { None };
        let Some(pool) = pool else {
            evaluate_nodes(nodes, connections);
            write_back(connections, nodes);
            return;
        };

        let node_bounds = curve.bounds(threads, nodes.len());
        trace!(threads, ?node_bounds, "tick");

        let readable: &[Connection<T>] = connections;
        let node_chunks = split_by_bounds(nodes, &node_bounds);
        pool.scope(move |scope| {
            for chunk in node_chunks {
                scope.spawn(move |_| evaluate_nodes(chunk, readable));
            }
        });

        let emitters: &[Node<T>] = nodes;
        let conn_bounds = curve.bounds(threads, connections.len());
        let conn_chunks = split_by_bounds(connections, &conn_bounds);
        pool.scope(move |scope| {
            for chunk in conn_chunks {
                scope.spawn(move |_| write_back(chunk, emitters));
            }
        });
    }

    /// Toggle the active buffer of every connection.
    pub(crate) fn flip<T: Signal>(
        &self,
        connections: &mut [Connection<T>],
        threads: usize,
        curve: PartitionCurve,
    ) {
        let pool = if threads > 1 { self.pool() } else { None };
        let Some(pool) = pool else {
            flip_all(connections);
            return;
        };

        let bounds = curve.bounds(threads, connections.len());
        let chunks = split_by_bounds(connections, &bounds);
        pool.scope(move |scope| {
            for chunk in chunks {
                scope.spawn(move |_| flip_all(chunk));
            }
        });
    }
}
