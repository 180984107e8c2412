//! ringkv-ring: the placement engine.
//!
//! An ordered map over ring positions answering wrap-around
//! successor/predecessor queries. For every key, the successor of the
//! key's hash is its primary node and the predecessor its replica.
//!
//! The ring itself is a plain data structure; concurrent callers share it
//! behind `Arc<RwLock<HashRing>>` so insertions and removals appear atomic
//! to queries.

use ringkv_common::NodeIdentity;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// One element of the ring: a position and the node occupying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingEntry {
    pub position: u32,
    pub identity: NodeIdentity,
}

/// The hash ring: an ordered map from ring position to node identity.
///
/// Positions are unique; at most one node occupies a position. The
/// balanced-tree backing keeps every operation logarithmic in the number
/// of nodes.
#[derive(Debug, Default)]
pub struct HashRing {
    slots: BTreeMap<u32, NodeIdentity>,
}

impl HashRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a node at `position`. A no-op returning `false` when the
    /// position is already occupied; the incumbent keeps the slot.
    pub fn insert(&mut self, position: u32, identity: NodeIdentity) -> bool {
        match self.slots.entry(position) {
            Entry::Vacant(slot) => {
                slot.insert(identity);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Drop the node at `position`. A no-op returning `None` when the
    /// position is empty.
    pub fn remove(&mut self, position: u32) -> Option<NodeIdentity> {
        self.slots.remove(&position)
    }

    /// The least occupied position `>= h`, wrapping to the ring minimum.
    /// `None` iff the ring is empty.
    pub fn successor(&self, h: u32) -> Option<RingEntry> {
        self.slots
            .range(h..)
            .next()
            .or_else(|| self.slots.iter().next())
            .map(|(&position, identity)| RingEntry {
                position,
                identity: identity.clone(),
            })
    }

    /// The greatest occupied position `<= h`, wrapping to the ring maximum.
    /// `None` iff the ring is empty.
    pub fn predecessor(&self, h: u32) -> Option<RingEntry> {
        self.slots
            .range(..=h)
            .next_back()
            .or_else(|| self.slots.iter().next_back())
            .map(|(&position, identity)| RingEntry {
                position,
                identity: identity.clone(),
            })
    }

    /// Look up the occupant of a position.
    pub fn get(&self, position: u32) -> Option<&NodeIdentity> {
        self.slots.get(&position)
    }

    /// Occupied positions in ascending order.
    pub fn positions(&self) -> Vec<u32> {
        self.slots.keys().copied().collect()
    }

    /// All entries in ascending position order.
    pub fn entries(&self) -> Vec<RingEntry> {
        self.slots
            .iter()
            .map(|(&position, identity)| RingEntry {
                position,
                identity: identity.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
