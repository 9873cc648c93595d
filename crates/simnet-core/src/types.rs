//! Newtype wrappers for simulator identifiers and the interface bitset.
//!
//! These types prevent accidental mixing of addresses, interface indices,
//! protocol numbers and switching labels, which all reduce to small
//! integers on the wire of the simulated network.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A node address in the simulated network.
///
/// Addresses are flat 64-bit values handed out by the membership store;
/// the engine never interprets their structure beyond masked comparison.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[must_use]
pub struct Address(pub u64);

impl Address {
    /// The null address: "no next hop" in a route entry.
    pub const NULL: Address = Address(0);

    /// Whether this is the null address.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

/// Index of a network interface on a node.
///
/// Physical interfaces are numbered from zero; virtual (tunnel) interfaces
/// live above the configured physical range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceId(pub u32);

/// Protocol number identifying the upper layer a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolId(pub u32);

impl ProtocolId {
    /// Protocol number of the trace-route facility.
    pub const TRACEROUTE: ProtocolId = ProtocolId(120);
}

/// A label used by the label-switching fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub u32);

/// A set of interface indices, stored as a growable bitset.
///
/// Route entries carry one of these as their outgoing-interface set.
/// Words are trimmed after every mutation so that equality and hashing
/// do not depend on capacity history.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
#[must_use]
pub struct InterfaceSet {
    words: Vec<u64>,
}

impl InterfaceSet {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// A set containing interfaces `0..count`.
    pub fn all_below(count: u32) -> Self {
        let mut set = Self::new();
        for i in 0..count {
            set.insert(InterfaceId(i));
        }
        set
    }

    /// Insert an interface. Returns `true` if it was not already present.
    pub fn insert(&mut self, iface: InterfaceId) -> bool {
        let (word, bit) = Self::locate(iface);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        let was_set = self.words[word] & bit != 0;
        self.words[word] |= bit;
        !was_set
    }

    /// Remove an interface. Returns `true` if it was present.
    pub fn remove(&mut self, iface: InterfaceId) -> bool {
        let (word, bit) = Self::locate(iface);
        let Some(w) = self.words.get_mut(word) else {
            return false;
        };
        let was_set = *w & bit != 0;
        *w &= !bit;
        self.trim();
        was_set
    }

    #[must_use]
    pub fn contains(&self, iface: InterfaceId) -> bool {
        let (word, bit) = Self::locate(iface);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// OR another set into this one. Returns `true` if this set changed.
    pub fn union_with(&mut self, other: &InterfaceSet) -> bool {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        let mut changed = false;
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            let merged = *w | o;
            changed |= merged != *w;
            *w = merged;
        }
        changed
    }

    /// Subtract another set from this one. Returns `true` if this set changed.
    pub fn subtract(&mut self, other: &InterfaceSet) -> bool {
        let mut changed = false;
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            let cleared = *w & !o;
            changed |= cleared != *w;
            *w = cleared;
        }
        self.trim();
        changed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Iterate over member interfaces in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, w)| {
            (0..64)
                .filter(move |bit| w & (1u64 << bit) != 0)
                .map(move |bit| InterfaceId(wi as u32 * 64 + bit))
        })
    }

    fn locate(iface: InterfaceId) -> (usize, u64) {
        ((iface.0 / 64) as usize, 1u64 << (iface.0 % 64))
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<InterfaceId> for InterfaceSet {
    fn from_iter<T: IntoIterator<Item = InterfaceId>>(iter: T) -> Self {
        let mut set = Self::new();
        for iface in iter {
            set.insert(iface);
        }
        set
    }
}

impl fmt::Debug for InterfaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|i| i.0)).finish()
    }
}
