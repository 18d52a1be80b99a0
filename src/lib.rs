//! # Symbios GNN
//!
//! A recurrent, weighted, directed signal graph that is advanced one discrete
//! tick at a time and shaped by genetic operators instead of gradient
//! descent.
//!
//! ## Features
//!
//! - **Double-Buffered Connections**: every edge has two buffers; a tick reads
//!   one and writes the other, so the result never depends on node order
//! - **Arena Storage**: nodes and connections live in flat vectors addressed by
//!   dense ids, with inputs, outputs and hidden nodes in contiguous partitions
//! - **Parallel Ticks**: dense graphs are split into contiguous id ranges and
//!   evaluated on a reusable `rayon` pool; sparse graphs tick inline
//! - **Crossover**: [`Graph::inherit`] builds a child from two parents with
//!   per-parent inclusion rates and optional buffer ("memory") inheritance
//! - **Binary Persistence**: the compact `.TEvoGNN` format round-trips
//!   topology and buffer state
//!
//! ## Quick Start
//!
//! ```rust
//! use symbios_gnn::{Graph, GraphConfig};
//!
//! // A NOT gate: one input, one output, one strongly negative edge
//! let mut graph: Graph<f32> = Graph::with_config(1, 1, GraphConfig::single_threaded());
//! graph.add_connection(0, 1, -20.0);
//!
//! graph.set_input(0, 1.0);
//! graph.step_n(5);
//! assert!((graph.output(0) + 1.0).abs() < 1e-3);
//!
//! graph.set_input(0, -1.0);
//! graph.step_n(5);
//! assert!((graph.output(0) - 1.0).abs() < 1e-3);
//! ```
//!
//! ## Crossover
//!
//! ```rust
//! use symbios_gnn::{Graph, GraphConfig, InheritConfig};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//! let mut a: Graph<f32> = Graph::with_config(2, 1, GraphConfig::single_threaded());
//! a.add_hidden_nodes(4);
//! a.add_random_connections(20, &mut rng);
//!
//! let mut b: Graph<f32> = Graph::with_config(3, 1, GraphConfig::single_threaded());
//! b.add_hidden_nodes(2);
//! b.add_random_connections(10, &mut rng);
//!
//! let child = Graph::inherit(&a, &b, &InheritConfig::default(), &mut rng);
//! assert_eq!(child.input_count(), 3);
//! assert_eq!(child.hidden_count(), 4);
//! ```
//!
//! ## Architecture
//!
//! ### Tick Semantics
//!
//! [`Graph::run`] evaluates every node against the *readable* side of its
//! incoming connections and stores the result in the *writable* side of its
//! outgoing connections. [`Graph::flip_buffers`] then swaps the two sides.
//! Input nodes emit their latched value, hidden nodes emit
//! `tanh(sum of weighted inputs)`, output nodes compute the same sum but keep
//! it for [`Graph::output`] instead of emitting.
//!
//! ### Threading
//!
//! A graph uses one worker per [`GraphConfig::density_threshold`] connections,
//! capped by [`GraphConfig::threads`]. The worker pool is built on first use
//! and reused for every later tick.

pub mod connection;
pub mod engine;
pub mod graph;
pub mod inherit;
pub mod node;
pub mod persist;
pub mod signal;

// Re-exports for convenience
pub use connection::{Buffer, Connection, ConnectionId};
pub use engine::{PartitionCurve, ThreadCount, DEFAULT_DENSITY_THRESHOLD};
pub use graph::{Graph, GraphConfig};
pub use inherit::{InheritConfig, Mutate};
pub use node::{Node, NodeId, NodeKind};
pub use persist::{PersistError, DEFAULT_PATH, FILE_EXTENSION};
pub use signal::Signal;
