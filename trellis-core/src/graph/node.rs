//! Graph Nodes
//!
//! Identity and status flags shared by every participant in the graph.

use std::cell::Cell;
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// Unique identifier for a node in the dependency graph.
///
/// Links between nodes are keyed by this ID on both sides, so a producer can
/// find its entry for a consumer (and vice versa) without holding a strong
/// reference to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A writable leaf. Producer only.
    State,

    /// A cached derivation. Both producer and consumer.
    Computed,

    /// A scheduled side effect. Consumer only.
    Effect,
}

/// Status bits carried by every node.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    /// The cached result may no longer reflect the node's inputs.
    pub const STALE: Self = Self(1);
    /// The node is running its own function right now.
    pub const COMPUTING: Self = Self(1 << 1);
    /// The node is reachable from at least one live effect.
    pub const WATCHED: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in [
            (Self::STALE, "STALE"),
            (Self::COMPUTING, "COMPUTING"),
            (Self::WATCHED, "WATCHED"),
        ] {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// Identity and flags embedded in every concrete node.
#[derive(Debug)]
pub(crate) struct NodeCore {
    id: NodeId,
    kind: NodeKind,
    flags: Cell<Flags>,
}

impl NodeCore {
    pub(crate) fn new(kind: NodeKind, flags: Flags) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            flags: Cell::new(flags),
        }
    }
}

/// Capabilities shared by producers and consumers.
pub(crate) trait SignalNode {
    fn core(&self) -> &NodeCore;

    /// Mark this node as possibly out of date and pass the news downstream.
    ///
    /// Fails with [`MutationDuringComputation`](crate::ReactiveError::MutationDuringComputation)
    /// if the node is in the middle of its own evaluation.
    fn invalidate(&self) -> Result<()>;

    fn id(&self) -> NodeId {
        self.core().id
    }

    fn kind(&self) -> NodeKind {
        self.core().kind
    }

    fn flags(&self) -> Flags {
        self.core().flags.get()
    }

    fn has_flags(&self, flags: Flags) -> bool {
        self.flags().contains(flags)
    }

    fn set_flags(&self, flags: Flags) {
        let mut current = self.flags();
        current.insert(flags);
        self.core().flags.set(current);
    }

    fn clear_flags(&self, flags: Flags) {
        let mut current = self.flags();
        current.remove(flags);
        self.core().flags.set(current);
    }

    fn is_watched(&self) -> bool {
        self.has_flags(Flags::WATCHED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
    }

    #[test]
    fn flag_transitions() {
        let mut flags = Flags::STALE;
        assert!(flags.contains(Flags::STALE));
        assert!(!flags.contains(Flags::COMPUTING));

        flags.insert(Flags::COMPUTING | Flags::WATCHED);
        assert!(flags.contains(Flags::STALE | Flags::WATCHED));

        flags.remove(Flags::STALE);
        assert!(!flags.contains(Flags::STALE));
        assert!(flags.contains(Flags::COMPUTING));
        assert_eq!(format!("{flags:?}"), "{COMPUTING, WATCHED}");
    }

    #[test]
    fn empty_flags_contain_nothing() {
        let flags = Flags::empty();
        assert!(!flags.contains(Flags::WATCHED));
        assert!(flags.contains(Flags::empty()));
        assert_eq!(flags, Flags::default());
    }
}
