//! The address-ownership collaborator consumed by the dispatcher.

use std::collections::HashSet;

use simnet_core::Address;

/// Membership view of the node's own addresses.
///
/// The dispatcher asks two questions: what address to stamp on locally
/// originated packets with no source, and whether a destination is ours.
pub trait Identity {
    /// The node's default address.
    fn default_address(&self) -> Address;

    /// Whether this node owns `addr` (unicast, multicast membership,
    /// broadcast; the store decides).
    fn owns(&self, addr: Address) -> bool;
}

/// Fixed identity backed by an address set; the usual host-side impl.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    default: Address,
    owned: HashSet<Address>,
}

impl StaticIdentity {
    pub fn new(default: Address) -> Self {
        let mut owned = HashSet::new();
        owned.insert(default);
        Self { default, owned }
    }

    /// Also claim ownership of `addr` (e.g. a joined multicast group).
    #[must_use]
    pub fn with(mut self, addr: Address) -> Self {
        self.owned.insert(addr);
        self
    }
}

impl Identity for StaticIdentity {
    fn default_address(&self) -> Address {
        self.default
    }

    fn owns(&self, addr: Address) -> bool {
        self.owned.contains(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_identity() {
        let id = StaticIdentity::new(Address(5)).with(Address(0xE0));
        assert_eq!(id.default_address(), Address(5));
        assert!(id.owns(Address(5)));
        assert!(id.owns(Address(0xE0)));
        assert!(!id.owns(Address(6)));
    }
}
