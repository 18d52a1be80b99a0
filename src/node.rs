//! Node types and their per-tick activation rule.
//!
//! Nodes live in a single arena indexed by [`NodeId`]. Each slot is tagged
//! with a [`NodeKind`] and keeps the connection ids of its incoming and
//! outgoing edges so topology edits never need a full rescan.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::connection::{Connection, ConnectionId};
use crate::signal::Signal;

/// Identifier of a node, unique across the graph's id space.
///
/// Ids are laid out contiguously: inputs first, then outputs, then hidden
/// nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position in the node arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Emits an externally latched value; never reads its incoming edges.
    Input,
    /// Squashes the sum of its inputs and keeps the result for querying;
    /// never writes its outgoing edges.
    Output,
    /// Squashes the sum of its inputs and emits the result on every
    /// outgoing edge.
    Hidden,
}

/// A node slot in the graph arena.
#[derive(Debug, Clone)]
pub struct Node<T> {
    id: NodeId,
    kind: NodeKind,
    /// Input: latched external value. Hidden: last activation. Output: last output.
    value: T,
    incoming: Vec<ConnectionId>,
    outgoing: Vec<ConnectionId>,
}

impl<T: Signal> Node<T> {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            value: T::ZERO,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    /// This node's id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// This node's role.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Current latched value (see [`NodeKind`] for its meaning per role).
    #[must_use]
    pub const fn value(&self) -> T {
        self.value
    }

    /// Incoming connection ids, in insertion order.
    #[must_use]
    pub fn incoming(&self) -> &[ConnectionId] {
        &self.incoming
    }

    /// Outgoing connection ids, in insertion order.
    #[must_use]
    pub fn outgoing(&self) -> &[ConnectionId] {
        &self.outgoing
    }

    /// The value this node writes to its outgoing edges, if it writes at all.
    #[inline]
    #[must_use]
    pub fn emission(&self) -> Option<T> {
        match self.kind {
            NodeKind::Input | NodeKind::Hidden => Some(self.value),
            NodeKind::Output => None,
        }
    }

    /// Run this node's activation rule against the readable side of its
    /// incoming connections.
    ///
    /// Reads only; the emitted value is written back to the outgoing edges
    /// by the tick engine in a separate pass.
    #[inline]
    pub(crate) fn evaluate(&mut self, connections: &[Connection<T>]) {
        match self.kind {
            NodeKind::Input => {}
            NodeKind::Hidden | NodeKind::Output => {
                let sum = self
                    .incoming
                    .iter()
                    .fold(T::ZERO, |acc, id| acc + connections[id.index()].read());
                self.value = sum.activate();
            }
        }
    }

    pub(crate) fn latch(&mut self, value: T) {
        self.value = value;
    }

    pub(crate) fn push_incoming(&mut self, id: ConnectionId) {
        self.incoming.push(id);
    }

    pub(crate) fn push_outgoing(&mut self, id: ConnectionId) {
        self.outgoing.push(id);
    }

    /// Drop references to connections that are gone after compaction and
    /// rewrite the survivors to their new arena positions.
    ///
    /// `remap[old]` is the new index, or `None` if the connection was removed.
    pub(crate) fn remap_connections(&mut self, remap: &[Option<usize>]) {
        let apply = |ids: &mut Vec<ConnectionId>| {
            ids.retain_mut(|id| match remap[id.index()] {
                Some(new_index) => {
                    *id = ConnectionId(new_index);
                    true
                }
                None => false,
            });
        };
        apply(&mut self.incoming);
        apply(&mut self.outgoing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Buffer;

    fn readable(weight: f32, value: f32) -> Connection<f32> {
        // Buffer B active, so reads come from A.
        Connection::with_state(Some(NodeId(0)), Some(NodeId(1)), weight, value, 0.0, Buffer::B)
    }

    #[test]
    fn test_input_node_keeps_latched_value() {
        let mut node: Node<f32> = Node::new(NodeId(0), NodeKind::Input);
        node.latch(0.75);
        node.push_incoming(ConnectionId(0));
        node.evaluate(&[readable(10.0, 10.0)]);

        assert_eq!(node.value(), 0.75);
        assert_eq!(node.emission(), Some(0.75));
    }

    #[test]
    fn test_hidden_node_sums_and_squashes() {
        let connections = vec![readable(0.5, 1.0), readable(-2.0, 0.25)];
        let mut node: Node<f32> = Node::new(NodeId(3), NodeKind::Hidden);
        node.push_incoming(ConnectionId(0));
        node.push_incoming(ConnectionId(1));
        node.evaluate(&connections);

        assert!((node.value() - 0.0f32.tanh()).abs() < 1e-6);
        assert_eq!(node.emission(), Some(node.value()));
    }

    #[test]
    fn test_output_node_does_not_emit() {
        let mut node: Node<f64> = Node::new(NodeId(1), NodeKind::Output);
        node.push_incoming(ConnectionId(0));
        let conn = Connection::with_state(
            Some(NodeId(0)),
            Some(NodeId(1)),
            -20.0,
            -1.0,
            0.0,
            Buffer::B,
        );
        node.evaluate(&[conn]);

        assert!((node.value() - 20.0f64.tanh()).abs() < 1e-12);
        assert_eq!(node.emission(), None);
    }

    #[test]
    fn test_remap_drops_and_renumbers() {
        let mut node: Node<f32> = Node::new(NodeId(2), NodeKind::Hidden);
        node.push_incoming(ConnectionId(0));
        node.push_incoming(ConnectionId(2));
        node.push_outgoing(ConnectionId(1));
        node.push_outgoing(ConnectionId(3));

        node.remap_connections(&[Some(0), None, Some(1), Some(2)]);

        assert_eq!(node.incoming(), &[ConnectionId(0), ConnectionId(1)]);
        assert_eq!(node.outgoing(), &[ConnectionId(2)]);
    }
}
