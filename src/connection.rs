//! Double-buffered weighted edges.
//!
//! A [`Connection`] carries one value per tick from its source node to its
//! target node. It holds two buffers: writes land in the *active* buffer
//! while reads see the *inactive* one, so a node emitting its new value can
//! never clobber a value another node still has to read in the same tick.
//! [`Connection::flip`] swaps the roles once every node has run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::signal::Signal;

/// Index of a connection inside its graph's connection arena.
///
/// Ids are dense and stable until
/// [`Graph::remove_disconnected_connections`](crate::Graph::remove_disconnected_connections)
/// compacts the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub(crate) usize);

impl ConnectionId {
    /// Id of the connection at arena position `index`.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Position in the connection arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Which of the two buffers currently receives writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Buffer {
    /// Writes go to buffer A, reads come from buffer B.
    A,
    /// Writes go to buffer B, reads come from buffer A.
    #[default]
    B,
}

impl Buffer {
    /// The opposite buffer.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Decode the on-disk flag (`true` = A is active).
    #[must_use]
    pub const fn from_flag(use_a: bool) -> Self {
        if use_a {
            Self::A
        } else {
            Self::B
        }
    }

    /// Encode as the on-disk flag (`true` = A is active).
    #[must_use]
    pub const fn as_flag(self) -> bool {
        matches!(self, Self::A)
    }
}

/// A directed, weighted edge with two time-step buffers.
///
/// Either endpoint may be cleared, which marks the connection disconnected;
/// disconnected connections stay in place until the owning graph compacts
/// them away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection<T> {
    weight: T,
    buffer_a: T,
    buffer_b: T,
    active: Buffer,
    source: Option<NodeId>,
    target: Option<NodeId>,
}

impl<T: Signal> Connection<T> {
    /// Create a connection with empty buffers, writing into buffer B first.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, weight: T) -> Self {
        Self::with_state(Some(source), Some(target), weight, T::ZERO, T::ZERO, Buffer::B)
    }

    /// Create a connection with explicit buffer contents and active buffer.
    #[must_use]
    pub const fn with_state(
        source: Option<NodeId>,
        target: Option<NodeId>,
        weight: T,
        buffer_a: T,
        buffer_b: T,
        active: Buffer,
    ) -> Self {
        Self {
            weight,
            buffer_a,
            buffer_b,
            active,
            source,
            target,
        }
    }

    /// Weighted value of the inactive buffer, i.e. what was written last tick.
    #[inline]
    #[must_use]
    pub fn read(&self) -> T {
        match self.active {
            Buffer::A => self.weight * self.buffer_b,
            Buffer::B => self.weight * self.buffer_a,
        }
    }

    /// Store `value` in the active buffer. Not visible to [`read`](Self::read)
    /// until the next [`flip`](Self::flip).
    #[inline]
    pub fn write(&mut self, value: T) {
        match self.active {
            Buffer::A => self.buffer_a = value,
            Buffer::B => self.buffer_b = value,
        }
    }

    /// Swap read and write roles of the two buffers.
    #[inline]
    pub fn flip(&mut self) {
        self.active = self.active.other();
    }

    /// `true` if either endpoint has been cleared.
    #[inline]
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        self.source.is_none() || self.target.is_none()
    }

    /// Source node, unless cleared.
    #[must_use]
    pub const fn source(&self) -> Option<NodeId> {
        self.source
    }

    /// Target node, unless cleared.
    #[must_use]
    pub const fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// Detach the source endpoint, marking the connection disconnected.
    pub fn clear_source(&mut self) {
        self.source = None;
    }

    /// Detach the target endpoint, marking the connection disconnected.
    pub fn clear_target(&mut self) {
        self.target = None;
    }

    /// Connection weight.
    #[must_use]
    pub const fn weight(&self) -> T {
        self.weight
    }

    /// Replace the connection weight.
    pub fn set_weight(&mut self, weight: T) {
        self.weight = weight;
    }

    /// Raw contents of buffer A.
    #[must_use]
    pub const fn buffer_a(&self) -> T {
        self.buffer_a
    }

    /// Raw contents of buffer B.
    #[must_use]
    pub const fn buffer_b(&self) -> T {
        self.buffer_b
    }

    /// The buffer currently receiving writes.
    #[must_use]
    pub const fn active(&self) -> Buffer {
        self.active
    }

    /// Force which buffer receives writes.
    pub fn set_active(&mut self, active: Buffer) {
        self.active = active;
    }

    /// Copy of this connection with cleared buffers and default buffer state.
    #[must_use]
    pub(crate) fn without_memory(&self) -> Self {
        Self::with_state(
            self.source,
            self.target,
            self.weight,
            T::ZERO,
            T::ZERO,
            Buffer::B,
        )
    }

    pub(crate) fn with_endpoints(mut self, source: NodeId, target: NodeId) -> Self {
        self.source = Some(source);
        self.target = Some(target);
        self
    }
}

impl<T: Signal> fmt::Display for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = |id: Option<NodeId>| id.map_or_else(|| "-".to_string(), |n| n.to_string());
        write!(
            f,
            "{} -> {} (w = {}, A = {}, B = {}, active = {:?})",
            endpoint(self.source),
            endpoint(self.target),
            self.weight,
            self.buffer_a,
            self.buffer_b,
            self.active
        )
    }
}
