//! Binary `.TEvoGNN` persistence.
//!
//! A file starts with a four-line text header followed by one fixed-width
//! record per connection:
//!
//! ```text
//! InputNodes=<n>\n
//! HiddenNodes=<n>\n
//! OutputNodes=<n>\n
//! Connections=<n>\n
//! { source: i32, target: i32, weight: T, buffer_a: T, buffer_b: T, a_active: u8 } * n
//! ```
//!
//! Records use the host's native byte order and `T`'s native width; there is
//! no version field or checksum, so files only move between hosts with the
//! same endianness and element type. A cleared endpoint is stored as `-1`.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::connection::{Buffer, Connection};
use crate::graph::{Graph, GraphConfig};
use crate::node::NodeId;
use crate::signal::Signal;

/// Conventional file extension, without the leading dot.
pub const FILE_EXTENSION: &str = "TEvoGNN";

/// Default save location.
pub const DEFAULT_PATH: &str = "./out.TEvoGNN";

const INPUT_KEY: &str = "InputNodes=";
const HIDDEN_KEY: &str = "\nHiddenNodes=";
const OUTPUT_KEY: &str = "\nOutputNodes=";
const CONNECTIONS_KEY: &str = "\nConnections=";

/// On-disk marker for a cleared endpoint.
const NO_NODE: i32 = -1;

/// Errors from reading or writing a `.TEvoGNN` file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Underlying read or write failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A header keyword did not match byte for byte.
    #[error("expected header keyword {expected:?}")]
    Keyword { expected: &'static str },

    /// A header count was missing or not an integer.
    #[error("invalid {field} count")]
    InvalidCount { field: &'static str },

    /// A header count was negative.
    #[error("negative {field} count: {value}")]
    NegativeCount { field: &'static str, value: i64 },

    /// The declared sizes cannot be allocated or addressed.
    #[error("{field} count {value} is too large")]
    TooLarge { field: &'static str, value: usize },

    /// The file ended before all declared records were read.
    #[error("connection record {record} of {expected} is truncated")]
    Truncated { record: usize, expected: usize },

    /// A record names a node the declared partitions do not contain.
    #[error("connection record {record} references node {id}, graph has {node_count} nodes")]
    EndpointOutOfRange {
        record: usize,
        id: i32,
        node_count: usize,
    },
}

/// Bytes per connection record for element type `T`.
#[must_use]
pub const fn record_size<T: Signal>() -> usize {
    2 * std::mem::size_of::<i32>() + 3 * T::BYTES + 1
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn encode_endpoint(id: Option<NodeId>) -> i32 {
    id.map_or(NO_NODE, |id| id.0 as i32)
}

impl<T: Signal> Graph<T> {
    /// Serialize the topology and buffer state into `writer`.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), PersistError> {
        let mut writer = BufWriter::new(writer);
        writeln!(
            writer,
            "{INPUT_KEY}{}{HIDDEN_KEY}{}{OUTPUT_KEY}{}{CONNECTIONS_KEY}{}",
            self.input_count(),
            self.hidden_count(),
            self.output_count(),
            self.connection_count()
        )?;

        let mut record = Vec::with_capacity(record_size::<T>());
        for conn in self.connections() {
            record.clear();
            record.extend_from_slice(&encode_endpoint(conn.source()).to_ne_bytes());
            record.extend_from_slice(&encode_endpoint(conn.target()).to_ne_bytes());
            conn.weight().extend_ne_bytes(&mut record);
            conn.buffer_a().extend_ne_bytes(&mut record);
            conn.buffer_b().extend_ne_bytes(&mut record);
            record.push(u8::from(conn.active().as_flag()));
            writer.write_all(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Write this graph to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        self.write_to(File::create(path)?)?;
        debug!(
            path = %path.display(),
            nodes = self.node_count(),
            connections = self.connection_count(),
            "saved graph"
        );
        Ok(())
    }

    /// Parse a graph from `reader`, giving it `config`.
    pub fn read_from<R: Read>(mut reader: R, config: GraphConfig) -> Result<Self, PersistError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes, config)
    }

    /// Parse a graph from an in-memory `.TEvoGNN` image.
    pub fn from_bytes(bytes: &[u8], config: GraphConfig) -> Result<Self, PersistError> {
        let mut cursor = Cursor::new(bytes);

        cursor.expect(INPUT_KEY)?;
        let inputs = cursor.count("input")?;
        cursor.expect(HIDDEN_KEY)?;
        let hidden = cursor.count("hidden")?;
        cursor.expect(OUTPUT_KEY)?;
        let outputs = cursor.count("output")?;
        cursor.expect(CONNECTIONS_KEY)?;
        let connections = cursor.count("connection")?;
        // Line terminator after the last count
        cursor.skip(1);

        // Node ids are stored as i32
        let total = inputs
            .checked_add(outputs)
            .and_then(|sum| sum.checked_add(hidden))
            .filter(|&sum| i32::try_from(sum).is_ok())
            .ok_or(PersistError::TooLarge {
                field: "node",
                value: inputs.saturating_add(outputs).saturating_add(hidden),
            })?;
        let mut graph = Self::try_with_layout(inputs, outputs, hidden, config)
            .map_err(|_| PersistError::TooLarge {
                field: "node",
                value: total,
            })?;

        let node_count = graph.node_count();
        let record_len = record_size::<T>();
        for record in 0..connections {
            let raw = cursor.take(record_len).ok_or(PersistError::Truncated {
                record,
                expected: connections,
            })?;
            let conn = decode_record::<T>(raw, record, node_count)?;
            graph.insert_connection(conn);
        }

        Ok(graph)
    }

    /// Replace this graph with the one stored at `path`.
    ///
    /// On error the graph is left exactly as it was. The loaded graph keeps
    /// this graph's [`GraphConfig`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let loaded = Self::read_from(File::open(path)?, *self.config())?;
        debug!(
            path = %path.display(),
            inputs = loaded.input_count(),
            hidden = loaded.hidden_count(),
            outputs = loaded.output_count(),
            connections = loaded.connection_count(),
            "loaded graph"
        );
        self.replace_topology(loaded);
        Ok(())
    }
}

fn decode_record<T: Signal>(
    raw: &[u8],
    record: usize,
    node_count: usize,
) -> Result<Connection<T>, PersistError> {
    let width = T::BYTES;
    let endpoint = |offset: usize| -> Result<Option<NodeId>, PersistError> {
        let mut id = [0u8; 4];
        id.copy_from_slice(&raw[offset..offset + 4]);
        let id = i32::from_ne_bytes(id);
        if id == NO_NODE {
            return Ok(None);
        }
        match u32::try_from(id) {
            Ok(index) if (index as usize) < node_count => Ok(Some(NodeId(index))),
            _ => Err(PersistError::EndpointOutOfRange {
                record,
                id,
                node_count,
            }),
        }
    };

    let source = endpoint(0)?;
    let target = endpoint(4)?;
    let weight = T::from_ne_slice(&raw[8..8 + width]);
    let buffer_a = T::from_ne_slice(&raw[8 + width..8 + 2 * width]);
    let buffer_b = T::from_ne_slice(&raw[8 + 2 * width..8 + 3 * width]);
    let active = Buffer::from_flag(raw[8 + 3 * width] != 0);

    Ok(Connection::with_state(
        source, target, weight, buffer_a, buffer_b, active,
    ))
}

/// Forward-only reader over the header and record bytes.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn expect(&mut self, keyword: &'static str) -> Result<(), PersistError> {
        if self.remaining().starts_with(keyword.as_bytes()) {
            self.pos += keyword.len();
            Ok(())
        } else {
            Err(PersistError::Keyword { expected: keyword })
        }
    }

    /// Parse a decimal count the way a formatted stream extraction does:
    /// leading whitespace, an optional sign, then digits.
    fn count(&mut self, field: &'static str) -> Result<usize, PersistError> {
        let rest = self.remaining();
        let start = rest
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let mut end = start;
        if matches!(rest.get(end), Some(b'+' | b'-')) {
            end += 1;
        }
        let digits = rest[end..].iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Err(PersistError::InvalidCount { field });
        }
        end += digits;

        let value: i64 = std::str::from_utf8(&rest[start..end])
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or(PersistError::InvalidCount { field })?;
        if value < 0 {
            return Err(PersistError::NegativeCount { field, value });
        }
        if value > i64::from(i32::MAX) {
            return Err(PersistError::InvalidCount { field });
        }

        self.pos += end;
        usize::try_from(value).map_err(|_| PersistError::InvalidCount { field })
    }

    fn skip(&mut self, len: usize) {
        self.pos = (self.pos + len).min(self.bytes.len());
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let chunk = self.remaining().get(..len)?;
        self.pos += len;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn sample() -> Graph<f32> {
        let mut graph = Graph::with_config(2, 1, GraphConfig::single_threaded());
        graph.add_hidden_nodes(3);
        graph.add_connection(0, 3, 1.5);
        graph.add_connection_with_state(4, 4, -0.5, 0.25, 0.75, Buffer::A);
        graph.add_connection(5, 2, 2.0);
        graph
    }

    fn header(inputs: i64, hidden: i64, outputs: i64, connections: i64) -> Vec<u8> {
        format!(
            "InputNodes={inputs}\nHiddenNodes={hidden}\nOutputNodes={outputs}\nConnections={connections}\n"
        )
        .into_bytes()
    }

    fn encode(graph: &Graph<f32>) -> Vec<u8> {
        let mut bytes = Vec::new();
        graph.write_to(&mut bytes).expect("Write failed");
        bytes
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&sample());
        let head = b"InputNodes=2\nHiddenNodes=3\nOutputNodes=1\nConnections=3\n";
        assert!(bytes.starts_with(head));
        assert_eq!(bytes.len(), head.len() + 3 * record_size::<f32>());
    }

    #[test]
    fn test_record_layout() {
        let mut graph: Graph<f64> = Graph::with_config(1, 1, GraphConfig::single_threaded());
        graph.add_connection_with_state(0, 1, 2.0, 3.0, 4.0, Buffer::A);
        let mut bytes = Vec::new();
        graph.write_to(&mut bytes).unwrap();

        assert_eq!(record_size::<f64>(), 33);
        let record = &bytes[bytes.len() - 33..];
        assert_eq!(record[..4], 0i32.to_ne_bytes());
        assert_eq!(record[4..8], 1i32.to_ne_bytes());
        assert_eq!(record[8..16], 2.0f64.to_ne_bytes());
        assert_eq!(record[16..24], 3.0f64.to_ne_bytes());
        assert_eq!(record[24..32], 4.0f64.to_ne_bytes());
        assert_eq!(record[32], 1);
    }

    #[test]
    fn test_in_memory_roundtrip() {
        let mut original = sample();
        original.add_random_connections(40, &mut test_rng());
        original.set_input(0, 1.0);
        original.step_n(3);

        let restored =
            Graph::<f32>::from_bytes(&encode(&original), GraphConfig::single_threaded()).unwrap();

        assert_eq!(restored.input_count(), original.input_count());
        assert_eq!(restored.hidden_count(), original.hidden_count());
        assert_eq!(restored.output_count(), original.output_count());
        assert_eq!(restored.connections(), original.connections());
        for (a, b) in restored.nodes().iter().zip(original.nodes()) {
            assert_eq!(a.incoming(), b.incoming());
            assert_eq!(a.outgoing(), b.outgoing());
        }
    }

    #[test]
    fn test_cleared_endpoint_survives_roundtrip() {
        let mut graph = sample();
        graph.connection_mut(ConnectionId(1)).unwrap().clear_source();

        let restored =
            Graph::<f32>::from_bytes(&encode(&graph), GraphConfig::single_threaded()).unwrap();
        let conn = restored.connection(ConnectionId(1)).unwrap();
        assert_eq!(conn.source(), None);
        assert_eq!(conn.target(), Some(NodeId(4)));
        assert!(conn.is_disconnected());
    }

    #[test]
    fn test_wrong_keyword_is_rejected() {
        let bytes = b"InputNodes=1\nHiddenNodez=0\nOutputNodes=1\nConnections=0\n";
        let err = Graph::<f32>::from_bytes(bytes, GraphConfig::default()).unwrap_err();
        assert!(matches!(err, PersistError::Keyword { expected } if expected == HIDDEN_KEY));

        let err = Graph::<f32>::from_bytes(b"", GraphConfig::default()).unwrap_err();
        assert!(matches!(err, PersistError::Keyword { expected } if expected == INPUT_KEY));
    }

    #[test]
    fn test_keyword_needs_preceding_newline() {
        let bytes = b"InputNodes=1 HiddenNodes=0\nOutputNodes=1\nConnections=0\n";
        let err = Graph::<f32>::from_bytes(bytes, GraphConfig::default()).unwrap_err();
        assert!(matches!(err, PersistError::Keyword { .. }));
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let err = Graph::<f32>::from_bytes(&header(1, -2, 1, 0), GraphConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            PersistError::NegativeCount {
                field: "hidden",
                value: -2
            }
        ));
    }

    #[test]
    fn test_missing_count_is_rejected() {
        let bytes = b"InputNodes=\nHiddenNodes=0\nOutputNodes=1\nConnections=0\n";
        let err = Graph::<f32>::from_bytes(bytes, GraphConfig::default()).unwrap_err();
        assert!(matches!(err, PersistError::InvalidCount { .. }));
    }

    #[test]
    fn test_default_path_uses_extension() {
        let path = Path::new(DEFAULT_PATH);
        assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some(FILE_EXTENSION));
    }

    #[test]
    fn test_oversized_header_is_rejected() {
        let bytes = b"InputNodes=1\nHiddenNodes=2147483647\nOutputNodes=1\nConnections=0\n";
        let err = Graph::<f32>::from_bytes(bytes, GraphConfig::single_threaded()).unwrap_err();
        assert!(matches!(
            err,
            PersistError::TooLarge {
                field: "node",
                value: 2_147_483_649
            }
        ));

        let max = i64::from(i32::MAX);
        let err = Graph::<f32>::from_bytes(&header(max, max, 0, 0), GraphConfig::default())
            .unwrap_err();
        assert!(matches!(err, PersistError::TooLarge { .. }));
    }

    #[test]
    fn test_truncated_records_are_rejected() {
        let mut bytes = encode(&sample());
        bytes.truncate(bytes.len() - 1);
        let err = Graph::<f32>::from_bytes(&bytes, GraphConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PersistError::Truncated {
                record: 2,
                expected: 3
            }
        ));
    }

    #[test]
    fn test_out_of_range_endpoint_is_rejected() {
        let mut bytes = header(1, 0, 1, 1);
        bytes.extend_from_slice(&0i32.to_ne_bytes());
        bytes.extend_from_slice(&9i32.to_ne_bytes());
        for value in [1.0f32, 0.0, 0.0] {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
        bytes.push(0);

        let err = Graph::<f32>::from_bytes(&bytes, GraphConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PersistError::EndpointOutOfRange {
                record: 0,
                id: 9,
                node_count: 2
            }
        ));
    }

    #[test]
    fn test_empty_graph_roundtrip() {
        let graph: Graph<f32> = Graph::with_config(0, 0, GraphConfig::single_threaded());
        let bytes = encode(&graph);
        assert_eq!(
            bytes,
            b"InputNodes=0\nHiddenNodes=0\nOutputNodes=0\nConnections=0\n"
        );
        let restored = Graph::<f32>::from_bytes(&bytes, GraphConfig::default()).unwrap();
        assert_eq!(restored.node_count(), 0);
    }

    #[test]
    fn test_failed_load_leaves_graph_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.TEvoGNN");
        std::fs::write(&path, header(1, -1, 1, 0)).unwrap();

        let mut graph = sample();
        let before = graph.connections().to_vec();
        assert!(graph.load(&path).is_err());
        assert_eq!(graph.connections(), before.as_slice());
        assert_eq!(graph.hidden_count(), 3);

        assert!(matches!(
            graph.load(dir.path().join("missing.TEvoGNN")),
            Err(PersistError::Io(_))
        ));
        assert_eq!(graph.connection_count(), 3);
    }

    #[test]
    fn test_load_keeps_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("graph.{FILE_EXTENSION}"));
        sample().save(&path).unwrap();

        let mut target: Graph<f32> = Graph::with_config(0, 0, GraphConfig::with_threads(3));
        target.load(&path).unwrap();
        assert_eq!(target.max_threads(), 3);
        assert_eq!(target.input_count(), 2);
        assert_eq!(target.connection_count(), 3);
    }
}
