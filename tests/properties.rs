//! Property tests for the tick and crossover invariants.
//!
//! Uses proptest over randomly wired graphs: partition sizes, connection
//! counts, input values and RNG seeds are all generated.

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use symbios_gnn::{
    Connection, ConnectionId, Graph, GraphConfig, InheritConfig, PartitionCurve, ThreadCount,
};

fn wired(
    seed: u64,
    inputs: usize,
    outputs: usize,
    hidden: usize,
    connections: usize,
    config: GraphConfig,
) -> Graph<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut graph = Graph::with_config(inputs, outputs, config);
    graph.add_hidden_nodes(hidden);
    graph.add_random_connections(connections, &mut rng);
    graph
}

fn readable(graph: &Graph<f32>) -> Vec<f32> {
    graph.connections().iter().map(Connection::read).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Values written by `run` never become readable before `flip_buffers`.
    #[test]
    fn run_is_invisible_until_flip(
        seed in any::<u64>(),
        hidden in 0usize..30,
        connections in 0usize..300,
        warmup in 0usize..5,
        input in -1.0f32..=1.0f32,
    ) {
        let mut graph = wired(seed, 2, 2, hidden, connections, GraphConfig::single_threaded());
        graph.set_inputs(&[input, -input]);
        graph.step_n(warmup);

        let before = readable(&graph);
        graph.run();
        prop_assert_eq!(before, readable(&graph));
    }

    /// Partitioning the tick across workers never changes its result.
    #[test]
    fn partitioning_does_not_change_results(
        seed in any::<u64>(),
        hidden in 0usize..40,
        connections in 1usize..400,
        threads in 2i32..6,
        exponent in 0.5f64..3.0,
        ticks in 1usize..8,
    ) {
        let config = GraphConfig {
            threads: ThreadCount(threads),
            density_threshold: 1,
            partition: PartitionCurve::Power(exponent),
        };
        let mut single = wired(seed, 3, 2, hidden, connections, GraphConfig::single_threaded());
        let mut threaded = wired(seed, 3, 2, hidden, connections, config);

        for graph in [&mut single, &mut threaded] {
            graph.set_inputs(&[1.0, -0.5, 0.25]);
            graph.step_n(ticks);
        }

        prop_assert_eq!(single.connections(), threaded.connections());
        prop_assert_eq!(single.outputs(), threaded.outputs());
    }

    /// Activations stay inside the tanh range for any weights.
    #[test]
    fn outputs_are_bounded(
        seed in any::<u64>(),
        hidden in 0usize..20,
        connections in 0usize..200,
        input in -100.0f32..100.0f32,
    ) {
        let mut graph = wired(seed, 1, 3, hidden, connections, GraphConfig::single_threaded());
        graph.set_input(0, input);
        graph.step_n(6);

        for node in graph.nodes().iter().skip(graph.input_count()) {
            prop_assert!((-1.0..=1.0).contains(&node.value()));
        }
    }

    /// Child partitions are the larger of each parent's, and every
    /// inherited endpoint exists in the child.
    #[test]
    fn crossover_respects_partitions(
        seed in any::<u64>(),
        a_sizes in (0usize..5, 0usize..5, 0usize..10),
        b_sizes in (0usize..5, 0usize..5, 0usize..10),
        rate_a in 0.0f64..=1.0,
        rate_b in 0.0f64..=1.0,
    ) {
        let a = wired(seed, a_sizes.0, a_sizes.1, a_sizes.2, 50, GraphConfig::single_threaded());
        let b = wired(seed ^ 1, b_sizes.0, b_sizes.1, b_sizes.2, 50, GraphConfig::single_threaded());
        let settings = InheritConfig { rate_a, rate_b, inherit_memory: false };
        let child = Graph::inherit(&a, &b, &settings, &mut ChaCha8Rng::seed_from_u64(seed));

        prop_assert_eq!(child.input_count(), a_sizes.0.max(b_sizes.0));
        prop_assert_eq!(child.output_count(), a_sizes.1.max(b_sizes.1));
        prop_assert_eq!(child.hidden_count(), a_sizes.2.max(b_sizes.2));
        prop_assert!(child.connection_count() <= a.connection_count() + b.connection_count());

        for conn in child.connections() {
            let source = conn.source().unwrap().index();
            let target = conn.target().unwrap().index();
            prop_assert!(source < child.node_count());
            prop_assert!(target < child.node_count());
        }
    }

    /// Compaction removes exactly the disconnected edges and leaves no
    /// dangling references.
    #[test]
    fn cleanup_removes_exactly_disconnected(
        seed in any::<u64>(),
        connections in 0usize..200,
        doomed in prop::collection::vec(any::<bool>(), 200),
    ) {
        let mut graph = wired(seed, 2, 1, 5, connections, GraphConfig::single_threaded());
        let mut cleared = 0;
        for (index, &drop) in doomed.iter().take(connections).enumerate() {
            if drop {
                graph.connection_mut(ConnectionId::from_index(index)).unwrap().clear_source();
                cleared += 1;
            }
        }

        prop_assert_eq!(graph.remove_disconnected_connections(), cleared);
        prop_assert_eq!(graph.connection_count(), connections - cleared);
        for node in graph.nodes() {
            for &id in node.incoming().iter().chain(node.outgoing()) {
                let conn = graph.connection(id).unwrap();
                prop_assert!(!conn.is_disconnected());
            }
        }
    }
}
