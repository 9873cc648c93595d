//! Routing table entries, update descriptors and change events.

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use simnet_core::{Address, InterfaceSet};

use crate::timer::TimerToken;
use super::key::RouteKey;

/// Opaque per-entry protocol extension (e.g. multicast group state).
///
/// The table stores it without interpreting it; equality for change
/// detection is pointer identity.
pub type RouteExtension = Arc<dyn Any + Send + Sync>;

/// A single routing table entry.
#[derive(Clone)]
#[must_use]
pub struct RouteEntry {
    pub key: RouteKey,
    /// Outgoing interfaces for matching packets.
    pub out_interfaces: InterfaceSet,
    /// Next-hop address; [`Address::NULL`] means directly attached.
    pub next_hop: Address,
    pub extension: Option<RouteExtension>,
    /// Absolute virtual-time expiry; `None` = never.
    pub expires: Option<f64>,
    /// Insertion sequence, used to break LONGEST-match ties
    /// (earliest insertion wins).
    pub(crate) seq: u64,
    pub(crate) timer: Option<TimerToken>,
}

impl RouteEntry {
    /// Whether the observable fields match (interfaces, next hop and
    /// extension identity). Expiry is deliberately excluded: a pure
    /// timeout refresh is a MODIFIED-worthy change only if it actually
    /// moves the expiry, which the table checks separately.
    pub(crate) fn same_content(&self, other: &RouteEntry) -> bool {
        self.out_interfaces == other.out_interfaces
            && self.next_hop == other.next_hop
            && match (&self.extension, &other.extension) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("key", &self.key)
            .field("out", &self.out_interfaces)
            .field("next_hop", &self.next_hop)
            .field("expires", &self.expires)
            .field("has_extension", &self.extension.is_some())
            .finish()
    }
}

/// Per-field update descriptor for [`crate::route::RoutingTable::add`].
///
/// `None` leaves the corresponding field of an existing entry untouched.
/// For a brand-new entry, unset fields fall back to an empty interface
/// set, the null next hop and no extension.
#[derive(Clone, Default)]
#[must_use]
pub struct RouteUpdate {
    pub out_interfaces: Option<InterfaceSet>,
    pub next_hop: Option<Address>,
    pub extension: Option<RouteExtension>,
}

impl RouteUpdate {
    /// Update only the outgoing interface set.
    pub fn interfaces(out: InterfaceSet) -> Self {
        Self {
            out_interfaces: Some(out),
            ..Self::default()
        }
    }

    /// Update the outgoing interface set and next hop.
    pub fn forward_to(out: InterfaceSet, next_hop: Address) -> Self {
        Self {
            out_interfaces: Some(out),
            next_hop: Some(next_hop),
            extension: None,
        }
    }
}

impl fmt::Debug for RouteUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteUpdate")
            .field("out", &self.out_interfaces)
            .field("next_hop", &self.next_hop)
            .field("sets_extension", &self.extension.is_some())
            .finish()
    }
}

/// What happened to a routing table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEventKind {
    Added,
    Modified,
    Removed,
}

/// Change notification emitted by mutating table calls.
///
/// True no-ops (re-adding identical content, pruning absent interfaces)
/// emit nothing.
#[derive(Debug, Clone)]
pub struct RouteEvent {
    pub kind: RouteEventKind,
    pub key: RouteKey,
    pub entry: RouteEntry,
}
