//! Hand-wired NOT, OR and AND gates, ticked until their outputs settle,
//! followed by a save/load round trip of the AND gate.
//!
//! Run with `RUST_LOG=debug cargo run --example logic_gates` to see the
//! library's tracing output.

use symbios_gnn::{Buffer, Graph, GraphConfig, PersistError, DEFAULT_PATH};
use tracing_subscriber::EnvFilter;

const TICKS: usize = 10;

const OR_TABLE: [([f32; 2], f32); 4] = [
    ([-1.0, -1.0], -1.0),
    ([1.0, -1.0], 1.0),
    ([-1.0, 1.0], 1.0),
    ([1.0, 1.0], 1.0),
];

const AND_TABLE: [([f32; 2], f32); 4] = [
    ([-1.0, -1.0], -1.0),
    ([1.0, -1.0], -1.0),
    ([-1.0, 1.0], -1.0),
    ([1.0, 1.0], 1.0),
];

fn show(graph: &mut Graph<f32>, inputs: &[f32], expected: f32) {
    graph.set_inputs(inputs);
    let trace: Vec<String> = (0..TICKS)
        .map(|_| {
            graph.step();
            format!("{:7.3}", graph.output(0))
        })
        .collect();
    println!("input {inputs:?}, expected [{expected:2}]");
    println!("{}", trace.join(""));
}

fn with_bias(inputs: usize, hidden: usize) -> Graph<f32> {
    let mut graph = Graph::with_config(inputs, 1, GraphConfig::default());
    let range = graph.add_hidden_nodes(hidden);
    // First hidden node holds a constant ~1 through a primed self-loop
    graph.add_connection_with_state(range.start, range.start, 20.0, 1.0, 1.0, Buffer::B);
    graph
}

fn main() -> Result<(), PersistError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("NOT gate");
    let mut not_gate: Graph<f32> = Graph::with_io(1, 1);
    not_gate.add_connection(0, 1, -20.0);
    show(&mut not_gate, &[-1.0], 1.0);
    show(&mut not_gate, &[1.0], -1.0);
    println!("{not_gate}\n");

    println!("OR gate");
    let mut or_gate = with_bias(2, 3);
    or_gate.add_connection(0, 4, 20.0);
    or_gate.add_connection(1, 5, 20.0);
    or_gate.add_connection(3, 4, 20.0);
    or_gate.add_connection(3, 5, 20.0);
    or_gate.add_connection(3, 2, -20.0);
    or_gate.add_connection(4, 2, 40.0);
    or_gate.add_connection(5, 2, 40.0);
    for (inputs, expected) in OR_TABLE {
        show(&mut or_gate, &inputs, expected);
    }
    println!("{or_gate}\n");

    println!("AND gate");
    let mut and_gate = with_bias(2, 3);
    and_gate.add_connection(0, 2, 40.0);
    and_gate.add_connection(1, 2, 40.0);
    and_gate.add_connection(3, 2, -60.0);
    for (inputs, expected) in AND_TABLE {
        show(&mut and_gate, &inputs, expected);
    }
    println!("{and_gate}\n");

    println!("Saving {DEFAULT_PATH}");
    and_gate.save(DEFAULT_PATH)?;

    let mut loaded: Graph<f32> = Graph::default();
    loaded.load(DEFAULT_PATH)?;
    println!("Loaded AND gate");
    show(&mut loaded, &[-1.0, -1.0], -1.0);
    show(&mut loaded, &[1.0, 1.0], 1.0);

    Ok(())
}
