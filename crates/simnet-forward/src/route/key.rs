//! Route keys: masked `(source, destination, incoming interface)` patterns.

use core::fmt;

use simnet_core::{Address, InterfaceId};

/// A masked address pattern.
///
/// A pattern matches an address when they agree on every masked bit.
/// Mask `0` is the full wildcard, mask `!0` is an exact address, and
/// anything in between is a prefix-style partial match. The stored value
/// is normalized (`value & mask`) so that pattern equality is structural.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct AddressPattern {
    value: u64,
    mask: u64,
}

impl AddressPattern {
    /// Match any address.
    pub const ANY: AddressPattern = AddressPattern { value: 0, mask: 0 };

    /// Match exactly one address.
    pub fn exact(addr: Address) -> Self {
        Self {
            value: addr.0,
            mask: u64::MAX,
        }
    }

    /// Match addresses agreeing with `addr` on the masked bits.
    pub fn masked(addr: Address, mask: u64) -> Self {
        Self {
            value: addr.0 & mask,
            mask,
        }
    }

    #[must_use]
    pub fn matches(&self, addr: Address) -> bool {
        addr.0 & self.mask == self.value
    }

    /// Number of constrained bits; higher is more specific.
    #[must_use]
    pub fn specificity(&self) -> u32 {
        self.mask.count_ones()
    }

    /// The single address this pattern matches, if it is exact.
    #[must_use]
    pub fn as_exact(&self) -> Option<Address> {
        (self.mask == u64::MAX).then_some(Address(self.value))
    }

    /// Whether some address matches both patterns.
    #[must_use]
    pub fn overlaps(&self, other: &AddressPattern) -> bool {
        let common = self.mask & other.mask;
        self.value & common == other.value & common
    }
}

impl fmt::Debug for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mask == 0 {
            write!(f, "*")
        } else if self.mask == u64::MAX {
            write!(f, "{:#x}", self.value)
        } else {
            write!(f, "{:#x}/{:#x}", self.value, self.mask)
        }
    }
}

/// A routing table key: source and destination patterns plus an optional
/// incoming-interface constraint (`None` = any interface).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct RouteKey {
    pub source: AddressPattern,
    pub destination: AddressPattern,
    pub incoming: Option<InterfaceId>,
}

impl RouteKey {
    /// Key matching a single concrete `(source, destination, interface)` triple.
    pub fn concrete(source: Address, destination: Address, incoming: InterfaceId) -> Self {
        Self {
            source: AddressPattern::exact(source),
            destination: AddressPattern::exact(destination),
            incoming: Some(incoming),
        }
    }

    /// Key matching one destination from any source on any interface.
    pub fn for_destination(destination: Address) -> Self {
        Self {
            source: AddressPattern::ANY,
            destination: AddressPattern::exact(destination),
            incoming: None,
        }
    }

    /// Whether a concrete arriving triple matches this key.
    ///
    /// `incoming = None` means the packet originated locally, which only
    /// interface-wildcard keys match.
    #[must_use]
    pub fn matches(&self, source: Address, destination: Address, incoming: Option<InterfaceId>) -> bool {
        self.source.matches(source)
            && self.destination.matches(destination)
            && match self.incoming {
                None => true,
                Some(want) => incoming == Some(want),
            }
    }

    /// How constrained this key is; the LONGEST match picks the highest.
    #[must_use]
    pub fn specificity(&self) -> u32 {
        self.source.specificity()
            + self.destination.specificity()
            + u32::from(self.incoming.is_some())
    }

    /// Whether some concrete triple matches both keys.
    #[must_use]
    pub fn overlaps(&self, other: &RouteKey) -> bool {
        self.source.overlaps(&other.source)
            && self.destination.overlaps(&other.destination)
            && match (self.incoming, other.incoming) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }

    /// Whether both address patterns are exact and the interface is fixed.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.source.specificity() == u64::BITS
            && self.destination.specificity() == u64::BITS
            && self.incoming.is_some()
    }
}

impl fmt::Debug for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?} -> {:?} @ ", self.source, self.destination)?;
        match self.incoming {
            Some(iface) => write!(f, "if{})", iface.0),
            None => write!(f, "*)"),
        }
    }
}

/// Lookup semantics for [`crate::route::RoutingTable::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Pattern equality with a registered key.
    Exact,
    /// Most specific registered key matching a concrete triple.
    Longest,
    /// All registered keys matching a concrete triple.
    All,
    /// All registered keys overlapping a (possibly wildcarded) pattern.
    Wildcard,
}
