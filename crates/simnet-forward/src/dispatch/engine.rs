//! The packet dispatcher.
//!
//! One dispatcher instance sits inside a simulated node and decides, for
//! every packet handed in from above or below, whether it is inspected
//! locally, forwarded, tunneled or dropped. All decisions are returned as
//! [`Action`]s; the dispatcher itself never touches links or ports.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, trace, warn};

use simnet_core::{InterfaceId, InterfaceSet, Packet, ProtocolId, DEFAULT_TTL};

use crate::cache::RouteCache;
use crate::config::ForwardConfig;
use crate::error::{ConfigError, RoutingError};
use crate::fragment::{fragment, ReassemblyEngine};
use crate::identity::Identity;
use crate::route::RoutingTable;
use crate::switching::{LabelSwitchTable, SwitchTable};
use crate::vif::VifTable;

use super::types::{Action, ControlRequest, DispatchPhase, UpperMessage};

/// Fallback route resolver consulted after a cache miss and a routing
/// table miss. Results are intentionally not cached; the helper owns
/// their lifetime.
pub trait LookupAssist {
    fn lookup(&mut self, packet: &Packet, incoming: Option<InterfaceId>) -> Option<InterfaceSet>;
}

/// Per-node forwarding orchestrator.
#[must_use]
pub struct PacketDispatcher<I: Identity> {
    config: ForwardConfig,
    identity: I,
    routes: Arc<Mutex<RoutingTable>>,
    cache: Option<RouteCache>,
    reassembly: ReassemblyEngine,
    switch: SwitchTable,
    label_switch: LabelSwitchTable,
    vifs: VifTable,
    ports: HashSet<ProtocolId>,
    assist: Option<Box<dyn LookupAssist>>,
    next_seq: u64,
}

impl<I: Identity> PacketDispatcher<I> {
    pub fn new(config: ForwardConfig, identity: I) -> Self {
        let mut switch = SwitchTable::new();
        for rule in &config.switch {
            switch.connect(rule.incoming, rule.outgoing);
        }
        let mut label_switch = LabelSwitchTable::new();
        for rule in &config.label_switch {
            label_switch.connect(rule.incoming, rule.in_label, rule.outgoing, rule.out_label);
        }
        let mut vifs = VifTable::new();
        for pack in &config.vifs {
            vifs.install(
                pack.start,
                pack.entries.iter().cloned().map(Into::into).collect(),
            );
        }
        let cache = config
            .route_cache
            .then(|| RouteCache::new(config.route_cache_capacity, config.route_cache_seed));
        let reassembly = ReassemblyEngine::new(config.fragment_ttl);

        Self {
            config,
            identity,
            routes: Arc::new(Mutex::new(RoutingTable::new())),
            cache,
            reassembly,
            switch,
            label_switch,
            vifs,
            ports: HashSet::new(),
            assist: None,
            next_seq: 1,
        }
    }

    /// Shared handle to the routing table, for host-side inspection.
    pub fn routes(&self) -> Arc<Mutex<RoutingTable>> {
        Arc::clone(&self.routes)
    }

    /// Bind an upper-layer port: delivered packets carrying `protocol`
    /// will be surfaced as [`Action::Deliver`].
    pub fn register_port(&mut self, protocol: ProtocolId) {
        self.ports.insert(protocol);
    }

    pub fn unregister_port(&mut self, protocol: ProtocolId) {
        self.ports.remove(&protocol);
    }

    pub fn set_assist(&mut self, assist: Box<dyn LookupAssist>) {
        self.assist = Some(assist);
    }

    /// Handle a message from the upper layer at virtual time `now`.
    pub fn from_upper(&mut self, msg: UpperMessage, now: f64) -> Vec<Action> {
        let mut actions = Vec::new();
        match msg {
            UpperMessage::Packet(mut packet) => {
                trace!(phase = ?DispatchPhase::ReceivedAbove, seq = packet.seq, "dispatch");
                self.stamp(&mut packet);
                debug!(origin = "local", packet = ?packet, "packet arrived");
                self.forward(packet, None, now, 0, &mut actions);
            }
            UpperMessage::Send {
                mut packet,
                interfaces,
                exclusive,
            } => {
                trace!(phase = ?DispatchPhase::ReceivedAbove, exclusive, "explicit send");
                self.stamp(&mut packet);
                let targets: Vec<InterfaceId> = if exclusive {
                    let mut all = InterfaceSet::all_below(self.config.interfaces);
                    all.subtract(&interfaces);
                    all.iter().collect()
                } else {
                    interfaces.iter().collect()
                };
                self.fan_out(packet, targets, now, 0, &mut actions);
            }
            UpperMessage::Control(req) => self.apply_control(req, now, &mut actions),
        }
        actions
    }

    /// Handle a packet arriving on interface `iface` at virtual time `now`.
    pub fn from_lower(&mut self, iface: InterfaceId, mut packet: Packet, now: f64) -> Vec<Action> {
        let mut actions = Vec::new();
        trace!(phase = ?DispatchPhase::ReceivedBelow, iface = iface.0, seq = packet.seq, "dispatch");
        debug!(origin = iface.0, packet = ?packet, "packet arrived");
        packet.incoming = Some(iface);

        // Cut-through paths bypass routing and fragmentation entirely.
        if let Some(label) = packet.label {
            if let Some((out, out_label)) = self.label_switch.get(iface, label) {
                self.cut_through(packet, out, Some(out_label), &mut actions);
                return actions;
            }
        }
        if let Some(out) = self.switch.get(iface) {
            self.cut_through(packet, out, None, &mut actions);
            return actions;
        }

        self.forward(packet, Some(iface), now, 0, &mut actions);
        actions
    }

    /// Advance the virtual clock: fire route expiries and reassembly
    /// timeouts that are due at or before `now`.
    pub fn advance(&mut self, now: f64) -> Vec<Action> {
        let mut actions = Vec::new();
        for event in self.routes_locked().advance(now) {
            actions.push(Action::RouteChanged(event));
        }
        self.reassembly.expire(now);
        actions
    }

    /// Virtual time of the next pending timer, if any.
    pub fn next_deadline(&mut self) -> Option<f64> {
        let routes = self.routes_locked().next_deadline();
        let frags = self.reassembly.next_deadline();
        match (routes, frags) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn apply_control(&mut self, req: ControlRequest, now: f64, actions: &mut Vec<Action>) {
        let mut routes = self.routes_locked();
        match req {
            ControlRequest::AddRoute {
                key,
                update,
                timeout,
            } => {
                if let Some(event) = routes.add(key, update, timeout, now) {
                    actions.push(Action::RouteChanged(event));
                }
            }
            ControlRequest::RemoveRoute { key, kind } => {
                for event in routes.remove(&key, kind) {
                    actions.push(Action::RouteChanged(event));
                }
            }
            ControlRequest::Graft {
                key,
                interfaces,
                extension,
                timeout,
            } => {
                if let Some(event) = routes.graft(&key, &interfaces, extension, timeout, now) {
                    actions.push(Action::RouteChanged(event));
                }
            }
            ControlRequest::Prune {
                key,
                interfaces,
                extension,
                timeout,
            } => {
                if let Some(event) = routes.prune(&key, &interfaces, extension, timeout, now) {
                    actions.push(Action::RouteChanged(event));
                }
            }
        }
    }

    /// Core forwarding walk for one packet.
    ///
    /// `depth` counts nested re-entries (tunnel unwraps, vif wraps,
    /// trace replies). Exceeding the configured cap is treated as a
    /// routing loop.
    fn forward(
        &mut self,
        mut packet: Packet,
        incoming: Option<InterfaceId>,
        now: f64,
        depth: usize,
        actions: &mut Vec<Action>,
    ) {
        if depth > self.config.max_forward_depth {
            let err = RoutingError::ForwardingLoop;
            error!(dst = %packet.destination, depth, "{err}");
            self.discard(packet, err.to_string(), actions);
            return;
        }

        // Router alert forces inspection at every transit hop; a locally
        // originated alert packet skips it to avoid a self-loop.
        let local = if packet.flags.router_alert {
            incoming.is_some()
        } else {
            self.identity.owns(packet.destination)
        };
        trace!(phase = ?DispatchPhase::LocalDecision, local, dst = %packet.destination, "dispatch");
        if local {
            self.deliver_local(packet.clone(), now, depth, actions);
        }

        packet.hops = packet.hops.saturating_add(1);
        if self.config.ttl_check && packet.hops > packet.ttl {
            warn!(seq = packet.seq, hops = packet.hops, "hop budget exhausted");
            self.discard(packet, "exceeds TTL", actions);
            return;
        }

        if !self.config.routing {
            // A non-routing host only ever emits its own traffic, out of
            // its single interface.
            if incoming.is_none() {
                self.send_down(InterfaceId(0), packet, now, depth, actions);
            }
            return;
        }

        let Some(out) = self.resolve(&packet, incoming) else {
            if local {
                trace!(dst = %packet.destination, "local destination only");
            } else {
                let err = RoutingError::NoRoute(packet.destination);
                warn!("{err}");
                self.discard(packet, "no route", actions);
            }
            return;
        };

        let targets: Vec<InterfaceId> = out
            .iter()
            .filter(|i| self.config.route_back || Some(*i) != incoming)
            .collect();
        trace!(phase = ?DispatchPhase::Forwarding, count = targets.len(), "dispatch");
        self.fan_out(packet, targets, now, depth, actions);
    }

    /// Local inspection: reassemble and unwrap until a whole, plain
    /// packet emerges, then answer or deliver it.
    fn deliver_local(
        &mut self,
        mut packet: Packet,
        now: f64,
        depth: usize,
        actions: &mut Vec<Action>,
    ) {
        loop {
            if packet.is_fragment() {
                trace!(phase = ?DispatchPhase::Reassembling, seq = packet.seq, "dispatch");
                match self.reassembly.feed(packet, now) {
                    Some(whole) => packet = whole,
                    None => return,
                }
            } else if packet.flags.tunnel {
                trace!(phase = ?DispatchPhase::Unwrapping, seq = packet.seq, "dispatch");
                match self.vifs.decapsulate(packet.clone()) {
                    Ok((vif, mut inner)) => {
                        // The inner packet resumes as a fresh arrival on
                        // the identified vif.
                        inner.incoming = Some(InterfaceId(vif));
                        self.forward(inner, Some(InterfaceId(vif)), now, depth + 1, actions);
                    }
                    Err(err) => {
                        warn!("{err}");
                        self.discard(packet, err.to_string(), actions);
                    }
                }
                return;
            } else {
                break;
            }
        }

        if packet.is_trace_request() && self.identity.owns(packet.destination) {
            let mut reply = Packet::new(
                packet.destination,
                packet.source,
                ProtocolId::TRACEROUTE,
                packet.payload_len,
                packet.body,
            );
            reply.flags.trace_reply = true;
            reply.ttl = DEFAULT_TTL;
            self.stamp(&mut reply);
            debug!(to = %reply.destination, "trace-route reply");
            self.forward(reply, None, now, depth + 1, actions);
            return;
        }

        if self.ports.contains(&packet.protocol) {
            trace!(phase = ?DispatchPhase::Delivered, proto = packet.protocol.0, "dispatch");
            actions.push(Action::Deliver {
                protocol: packet.protocol,
                packet,
            });
        } else {
            warn!(proto = packet.protocol.0, "no port bound for protocol");
        }
    }

    /// Resolve the outgoing interface set: cache, then table, then the
    /// assist helper. Table hits populate the cache; assist results are
    /// never cached.
    fn resolve(&mut self, packet: &Packet, incoming: Option<InterfaceId>) -> Option<InterfaceSet> {
        let (src, dst) = (packet.source, packet.destination);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lookup(src, dst, incoming) {
                trace!(dst = %dst, "route cache hit");
                return Some(hit.clone());
            }
        }

        let from_table = self
            .routes_locked()
            .get_longest(src, dst, incoming)
            .map(|entry| entry.out_interfaces.clone());
        if let Some(out) = from_table {
            if let Some(cache) = &mut self.cache {
                cache.insert(src, dst, incoming, out.clone());
            }
            return Some(out);
        }

        self.assist.as_mut()?.lookup(packet, incoming)
    }

    /// Send one copy of `packet` down each target interface, cloning for
    /// every destination beyond the first.
    fn fan_out(
        &mut self,
        packet: Packet,
        targets: Vec<InterfaceId>,
        now: f64,
        depth: usize,
        actions: &mut Vec<Action>,
    ) {
        let mut packet = Some(packet);
        let mut remaining = targets.len();
        for iface in targets {
            remaining -= 1;
            let copy = if remaining == 0 {
                packet.take()
            } else {
                packet.clone()
            };
            if let Some(copy) = copy {
                self.send_down(iface, copy, now, depth, actions);
            }
        }
    }

    /// Emit a packet toward one interface: tunnel it if the index is
    /// virtual, otherwise fragment to the interface MTU and transmit.
    fn send_down(
        &mut self,
        iface: InterfaceId,
        packet: Packet,
        now: f64,
        depth: usize,
        actions: &mut Vec<Action>,
    ) {
        if iface.0 >= self.config.interfaces {
            if self.config.vif_enabled {
                let default_local = self.identity.default_address();
                match self.vifs.encapsulate(packet.clone(), iface.0, default_local) {
                    Ok(mut outer) => {
                        self.stamp(&mut outer);
                        trace!(vif = iface.0, "tunneling via vif");
                        self.forward(outer, None, now, depth + 1, actions);
                    }
                    Err(err) => {
                        error!("{err}");
                        self.discard(packet, err.to_string(), actions);
                    }
                }
            } else {
                let err = ConfigError::NoSuchInterface(iface);
                error!("{err}");
                self.discard(packet, err.to_string(), actions);
            }
            return;
        }

        let mtu = self.config.mtu_for(iface);
        if packet.size() > mtu {
            if packet.flags.dont_fragment {
                warn!(seq = packet.seq, mtu, "fragmentation needed but forbidden");
                self.discard(packet, "fragmentation needed", actions);
                return;
            }
            match fragment(&packet, mtu) {
                Ok(pieces) => {
                    for piece in pieces {
                        actions.push(Action::Transmit {
                            iface,
                            packet: piece,
                        });
                    }
                }
                Err(err) => {
                    error!("{err}");
                    self.discard(packet, err.to_string(), actions);
                }
            }
            return;
        }
        actions.push(Action::Transmit { iface, packet });
    }

    fn cut_through(
        &mut self,
        mut packet: Packet,
        out: InterfaceId,
        out_label: Option<simnet_core::Label>,
        actions: &mut Vec<Action>,
    ) {
        packet.hops = packet.hops.saturating_add(1);
        if self.config.ttl_check && packet.hops > packet.ttl {
            warn!(seq = packet.seq, hops = packet.hops, "hop budget exhausted");
            self.discard(packet, "exceeds TTL", actions);
            return;
        }
        if out.0 >= self.config.interfaces {
            let err = ConfigError::NoSuchInterface(out);
            error!("{err}");
            self.discard(packet, err.to_string(), actions);
            return;
        }
        if let Some(label) = out_label {
            packet.label = Some(label);
        }
        trace!(phase = ?DispatchPhase::Forwarding, out = out.0, "cut-through");
        actions.push(Action::Transmit { iface: out, packet });
    }

    /// Stamp origin fields on a packet this node is about to emit.
    fn stamp(&mut self, packet: &mut Packet) {
        if packet.source.is_null() {
            packet.source = self.identity.default_address();
        }
        packet.header_len = self.config.header_len;
        packet.seq = self.next_seq;
        self.next_seq += 1;
    }

    fn discard(&self, packet: Packet, reason: impl Into<String>, actions: &mut Vec<Action>) {
        let reason = reason.into();
        trace!(phase = ?DispatchPhase::Dropped, %reason, "dispatch");
        actions.push(Action::Drop { packet, reason });
    }

    fn routes_locked(&self) -> MutexGuard<'_, RoutingTable> {
        match self.routes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
