//! The graph aggregate: node arena, connection arena and the operations on them.
//!
//! A [`Graph`] owns every node and every connection. Nodes occupy one arena
//! indexed by [`NodeId`], laid out in three contiguous partitions:
//!
//! ```text
//! [0, inputs)                      input nodes
//! [inputs, inputs + outputs)       output nodes
//! [inputs + outputs, node_count)   hidden nodes
//! ```
//!
//! Input and output partitions are sized once by [`Graph::initialize`];
//! hidden nodes are appended with [`Graph::add_hidden_nodes`]. Connections
//! live in a flat arena and nodes refer to them by [`ConnectionId`].

use std::collections::TryReserveError;
use std::fmt;
use std::ops::Range;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::{Buffer, Connection, ConnectionId};
use crate::engine::{Executor, PartitionCurve, ThreadCount, DEFAULT_DENSITY_THRESHOLD};
use crate::node::{Node, NodeId, NodeKind};
use crate::signal::Signal;

/// Magnitude bound of weights drawn by [`Graph::add_random_connections`].
const RANDOM_WEIGHT_RANGE: f64 = 10.0;

/// Execution settings for a graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Maximum worker threads for a tick.
    #[serde(default)]
    pub threads: ThreadCount,
    /// Connections per worker thread; sparser graphs tick on fewer threads.
    #[serde(default = "default_density_threshold")]
    pub density_threshold: usize,
    /// How the node id space is split between workers.
    #[serde(default)]
    pub partition: PartitionCurve,
}

const fn default_density_threshold() -> usize {
    DEFAULT_DENSITY_THRESHOLD
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            threads: ThreadCount::AUTO,
            density_threshold: DEFAULT_DENSITY_THRESHOLD,
            partition: PartitionCurve::Linear,
        }
    }
}

impl GraphConfig {
    /// Tick on the calling thread only.
    #[must_use]
    pub fn single_threaded() -> Self {
        Self {
            threads: ThreadCount::SINGLE,
            ..Default::default()
        }
    }

    /// Allow up to `threads` workers (negative = auto-detect).
    #[must_use]
    pub fn with_threads(threads: i32) -> Self {
        Self {
            threads: ThreadCount(threads),
            ..Default::default()
        }
    }
}

/// A recurrent, weighted, directed signal graph advanced one tick at a time.
///
/// Each tick is a [`run`](Self::run) (every node reads last tick's values and
/// writes its new value) followed by a [`flip_buffers`](Self::flip_buffers)
/// (new values become readable). [`step`](Self::step) does both.
///
/// Topology must not change between `run` and `flip_buffers`.
#[derive(Debug, Clone)]
pub struct Graph<T = f32> {
    nodes: Vec<Node<T>>,
    connections: Vec<Connection<T>>,
    input_count: usize,
    output_count: usize,
    config: GraphConfig,
    executor: Executor,
}

impl<T: Signal> Default for Graph<T> {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl<T: Signal> Graph<T> {
    /// Create an empty graph with no nodes.
    #[must_use]
    pub fn new(config: GraphConfig) -> Self {
        Self {
            nodes: Vec::new(),
            connections: Vec::new(),
            input_count: 0,
            output_count: 0,
            executor: Executor::new(config.threads),
            config,
        }
    }

    /// Create a graph with `inputs` input and `outputs` output nodes and the
    /// default configuration.
    #[must_use]
    pub fn with_io(inputs: usize, outputs: usize) -> Self {
        Self::with_config(inputs, outputs, GraphConfig::default())
    }

    /// Create a graph with `inputs` input and `outputs` output nodes.
    #[must_use]
    pub fn with_config(inputs: usize, outputs: usize, config: GraphConfig) -> Self {
        let mut graph = Self::new(config);
        graph.resize_io(inputs, outputs);
        graph
    }

    /// Create a graph with all three partitions sized up front, reporting
    /// allocation failure instead of aborting.
    pub(crate) fn try_with_layout(
        inputs: usize,
        outputs: usize,
        hidden: usize,
        config: GraphConfig,
    ) -> Result<Self, TryReserveError> {
        let mut graph = Self::new(config);
        graph
            .nodes
            .try_reserve_exact(inputs.saturating_add(outputs).saturating_add(hidden))?;
        graph.resize_io(inputs, outputs);
        graph.add_hidden_nodes(hidden);
        Ok(graph)
    }

    /// Discard everything and start over with fresh input/output partitions.
    pub fn initialize(&mut self, inputs: usize, outputs: usize, threads: ThreadCount) {
        if threads != self.config.threads {
            self.config.threads = threads;
            self.executor = Executor::new(threads);
        }
        self.resize_io(inputs, outputs);
    }

    fn resize_io(&mut self, inputs: usize, outputs: usize) {
        self.clear();
        self.nodes.reserve(inputs + outputs);
        for _ in 0..inputs {
            self.push_node(NodeKind::Input);
        }
        for _ in 0..outputs {
            self.push_node(NodeKind::Output);
        }
        self.input_count = inputs;
        self.output_count = outputs;
    }

    /// Take over the nodes and connections of `other`, keeping this graph's
    /// configuration and worker pool.
    pub(crate) fn replace_topology(&mut self, other: Self) {
        self.nodes = other.nodes;
        self.connections = other.connections;
        self.input_count = other.input_count;
        self.output_count = other.output_count;
    }

    /// Remove every node and connection.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
        self.input_count = 0;
        self.output_count = 0;
    }

    #[allow(clippy::cast_possible_truncation)]
    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(id, kind));
        id
    }

    /// Append `count` hidden nodes with consecutive ids starting at the
    /// current node count. Returns the id range of the new nodes.
    pub fn add_hidden_nodes(&mut self, count: usize) -> Range<usize> {
        let start = self.nodes.len();
        self.nodes.reserve(count);
        for _ in 0..count {
            self.push_node(NodeKind::Hidden);
        }
        start..self.nodes.len()
    }

    /// Connect `source` to `target` with empty buffers.
    ///
    /// Parallel edges and self-loops are allowed.
    ///
    /// # Panics
    ///
    /// Panics if either id is not below [`node_count`](Self::node_count).
    pub fn add_connection(&mut self, source: usize, target: usize, weight: T) -> ConnectionId {
        let (source, target) = self.endpoint_ids(source, target);
        self.insert_connection(Connection::new(source, target, weight))
    }

    /// Connect `source` to `target` with explicit buffer contents and active
    /// buffer, e.g. to seed a constant bias loop.
    ///
    /// # Panics
    ///
    /// Panics if either id is not below [`node_count`](Self::node_count).
    pub fn add_connection_with_state(
        &mut self,
        source: usize,
        target: usize,
        weight: T,
        buffer_a: T,
        buffer_b: T,
        active: Buffer,
    ) -> ConnectionId {
        let (source, target) = self.endpoint_ids(source, target);
        self.insert_connection(Connection::with_state(
            Some(source),
            Some(target),
            weight,
            buffer_a,
            buffer_b,
            active,
        ))
    }

    /// Append `connection` to the arena and register it with its endpoints.
    ///
    /// A cleared endpoint is simply not wired.
    ///
    /// # Panics
    ///
    /// Panics if a present endpoint is not below [`node_count`](Self::node_count).
    pub fn insert_connection(&mut self, connection: Connection<T>) -> ConnectionId {
        let node_count = self.nodes.len();
        let in_range = |id: Option<NodeId>| id.map_or(true, |id| id.index() < node_count);
        assert!(
            in_range(connection.source()) && in_range(connection.target()),
            "connection endpoint out of range for graph with {node_count} nodes: {connection}"
        );

        let id = ConnectionId(self.connections.len());
        if let Some(source) = connection.source() {
            self.nodes[source.index()].push_outgoing(id);
        }
        if let Some(target) = connection.target() {
            self.nodes[target.index()].push_incoming(id);
        }
        self.connections.push(connection);
        id
    }

    /// Add `count` connections between uniformly drawn nodes with weights
    /// uniform in `[-10, 10)`. Does nothing on a graph without nodes.
    pub fn add_random_connections<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) {
        let node_count = self.node_count();
        if node_count == 0 {
            return;
        }

        self.connections.reserve(count);
        for _ in 0..count {
            let source = self.node_id(rng.random_range(0..node_count));
            let target = self.node_id(rng.random_range(0..node_count));
            let weight = T::from_f64(rng.random_range(-RANDOM_WEIGHT_RANGE..RANDOM_WEIGHT_RANGE));
            self.insert_connection(Connection::new(source, target, weight));
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn node_id(&self, index: usize) -> NodeId {
        NodeId(index as u32)
    }

    fn endpoint_ids(&self, source: usize, target: usize) -> (NodeId, NodeId) {
        let node_count = self.nodes.len();
        assert!(
            source < node_count && target < node_count,
            "connection {source} -> {target} out of range for graph with {node_count} nodes"
        );
        (self.node_id(source), self.node_id(target))
    }

    /// Drop every disconnected connection from the node lists and compact
    /// the arena. Returns the number of connections removed.
    ///
    /// Surviving connections keep their relative order; their ids are
    /// renumbered, so previously obtained [`ConnectionId`]s become stale.
    pub fn remove_disconnected_connections(&mut self) -> usize {
        let mut remap = Vec::with_capacity(self.connections.len());
        let mut kept = 0;
        for conn in &self.connections {
            if conn.is_disconnected() {
                remap.push(None);
            } else {
                remap.push(Some(kept));
                kept += 1;
            }
        }

        let removed = self.connections.len() - kept;
        if removed == 0 {
            return 0;
        }

        for node in &mut self.nodes {
            node.remap_connections(&remap);
        }
        self.connections.retain(|conn| !conn.is_disconnected());

        debug!(removed, remaining = kept, "compacted disconnected connections");
        removed
    }

    /// Latch an external value into input node `index`; it is emitted on the
    /// next [`run`](Self::run).
    ///
    /// # Panics
    ///
    /// Panics if `index >= input_count()`.
    pub fn set_input(&mut self, index: usize, value: T) {
        let range = self.input_range();
        self.nodes[range][index].latch(value);
    }

    /// Latch all input values at once.
    ///
    /// # Panics
    ///
    /// Panics if `values.len() != input_count()`.
    pub fn set_inputs(&mut self, values: &[T]) {
        assert_eq!(
            values.len(),
            self.input_count,
            "Input length mismatch: expected {}, got {}",
            self.input_count,
            values.len()
        );
        for (node, &value) in self.nodes.iter_mut().zip(values) {
            node.latch(value);
        }
    }

    /// Currently latched value of input node `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= input_count()`.
    #[must_use]
    pub fn input(&self, index: usize) -> T {
        self.nodes[self.input_range()][index].value()
    }

    /// Last computed value of output node `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= output_count()`.
    #[must_use]
    pub fn output(&self, index: usize) -> T {
        self.nodes[self.output_range()][index].value()
    }

    /// Last computed values of every output node, in order.
    #[must_use]
    pub fn outputs(&self) -> Vec<T> {
        self.nodes[self.output_range()]
            .iter()
            .map(Node::value)
            .collect()
    }

    /// Evaluate every node once against last tick's buffers.
    ///
    /// New values land in the writable buffers and stay invisible to
    /// [`Connection::read`] until [`flip_buffers`](Self::flip_buffers).
    pub fn run(&mut self) {
        let threads = self.thread_count();
        self.executor.run(
            &mut self.nodes,
            &mut self.connections,
            threads,
            self.config.partition,
        );
    }

    /// Make the values written by the last [`run`](Self::run) readable.
    pub fn flip_buffers(&mut self) {
        let threads = self.thread_count();
        self.executor
            .flip(&mut self.connections, threads, self.config.partition);
    }

    /// One full tick: [`run`](Self::run) then [`flip_buffers`](Self::flip_buffers).
    pub fn step(&mut self) {
        self.run();
        self.flip_buffers();
    }

    /// Run `ticks` full ticks.
    pub fn step_n(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Worker threads the next tick will use, given the current density.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.executor
            .thread_count(self.connections.len(), self.config.density_threshold)
    }

    /// Resolved maximum worker thread count.
    #[must_use]
    pub const fn max_threads(&self) -> usize {
        self.executor.max_threads()
    }

    /// Execution settings.
    #[must_use]
    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Number of input nodes.
    #[must_use]
    pub const fn input_count(&self) -> usize {
        self.input_count
    }

    /// Number of output nodes.
    #[must_use]
    pub const fn output_count(&self) -> usize {
        self.output_count
    }

    /// Number of hidden nodes.
    #[must_use]
    pub fn hidden_count(&self) -> usize {
        self.nodes.len() - self.input_count - self.output_count
    }

    /// Total number of nodes across all partitions.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of connections, including disconnected ones not yet removed.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Id range of the input partition.
    #[must_use]
    pub const fn input_range(&self) -> Range<usize> {
        0..self.input_count
    }

    /// Id range of the output partition.
    #[must_use]
    pub const fn output_range(&self) -> Range<usize> {
        self.input_count..self.input_count + self.output_count
    }

    /// Id range of the hidden partition.
    #[must_use]
    pub fn hidden_range(&self) -> Range<usize> {
        self.input_count + self.output_count..self.nodes.len()
    }

    /// All nodes, indexed by id.
    #[must_use]
    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    /// Node with the given id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node<T>> {
        self.nodes.get(id.index())
    }

    /// All connections, in insertion order.
    #[must_use]
    pub fn connections(&self) -> &[Connection<T>] {
        &self.connections
    }

    /// Connection with the given id.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<&Connection<T>> {
        self.connections.get(id.index())
    }

    /// Mutable access to a connection, e.g. to adjust its weight or clear an
    /// endpoint before [`remove_disconnected_connections`](Self::remove_disconnected_connections).
    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection<T>> {
        self.connections.get_mut(id.index())
    }
}

impl<T: Signal> fmt::Display for Graph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Evolution Graph Neural Network")?;
        writeln!(f, "\tInput Nodes:\t{}", self.input_count())?;
        writeln!(f, "\tHidden Nodes:\t{}", self.hidden_count())?;
        writeln!(f, "\tOutput Nodes:\t{}", self.output_count())?;
        write!(f, "\tConnections:\t{}", self.connection_count())
    }
}
