//! Virtual interface tunnels (packet-in-packet).
//!
//! A virtual interface is addressed like a physical one but implemented
//! by wrapping packets in an outer packet toward the vif's configured
//! peer. The peer address doubles as the reverse-lookup key when a
//! tunneled packet comes back in.

use std::collections::{BTreeMap, HashMap};

use simnet_core::{Address, Body, Packet};
use tracing::trace;

use crate::error::{ConfigError, DispatchError};

/// Configuration of one virtual interface.
#[derive(Debug, Clone)]
pub struct VifEntry {
    /// Local source address override; the node default is used when unset.
    pub local: Option<Address>,
    /// Remote tunnel endpoint. A vif with no peer cannot tunnel.
    pub peer: Option<Address>,
}

/// Table of configured virtual interfaces, keyed by vif index.
#[derive(Debug, Default)]
#[must_use]
pub struct VifTable {
    entries: BTreeMap<u32, VifEntry>,
    by_peer: HashMap<Address, u32>,
}

impl VifTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a contiguous pack of vifs starting at `start`.
    pub fn install(&mut self, start: u32, pack: Vec<VifEntry>) {
        for (i, entry) in pack.into_iter().enumerate() {
            let index = start + i as u32;
            if let Some(old) = self.entries.get(&index) {
                if let Some(peer) = old.peer {
                    self.by_peer.remove(&peer);
                }
            }
            if let Some(peer) = entry.peer {
                self.by_peer.insert(peer, index);
            }
            self.entries.insert(index, entry);
        }
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Option<&VifEntry> {
        self.entries.get(&index)
    }

    /// Reverse lookup: which vif has this peer?
    #[must_use]
    pub fn vif_for_peer(&self, peer: Address) -> Option<u32> {
        self.by_peer.get(&peer).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wrap `packet` in an outer packet toward the vif's peer.
    ///
    /// The outer source is the vif's local override, falling back to
    /// `default_local`. Router alert is cleared on the outer packet so
    /// intermediate hops forward it untouched; the outer packet is then
    /// routed and fragmented like any other traffic.
    pub fn encapsulate(
        &self,
        packet: Packet,
        vif_index: u32,
        default_local: Address,
    ) -> Result<Packet, DispatchError> {
        let entry = self
            .get(vif_index)
            .ok_or(ConfigError::VifUnconfigured(vif_index))?;
        let peer = entry.peer.ok_or(ConfigError::VifNoPeer(vif_index))?;
        let local = entry.local.unwrap_or(default_local);

        let mut outer = Packet::new(
            local,
            peer,
            packet.protocol,
            packet.size(),
            Body::Inner(Box::new(packet)),
        );
        outer.flags.tunnel = true;
        outer.flags.router_alert = false;
        trace!(vif = vif_index, peer = %peer, "encapsulated packet");
        Ok(outer)
    }

    /// Unwrap a tunnel packet arriving from the network.
    ///
    /// The vif is identified from the outer source address; an outer
    /// source matching no configured peer is an error. The inner packet
    /// resumes processing as if it had arrived on the identified vif.
    pub fn decapsulate(&self, outer: Packet) -> Result<(u32, Packet), DispatchError> {
        let vif_index = self
            .vif_for_peer(outer.source)
            .ok_or(DispatchError::UnknownTunnelPeer(outer.source))?;
        let inner = outer.into_inner()?;
        trace!(vif = vif_index, "decapsulated packet");
        Ok((vif_index, inner))
    }
}
