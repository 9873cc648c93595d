//! Messages in and out of the dispatcher.

use simnet_core::{InterfaceId, InterfaceSet, Packet, ProtocolId};

use crate::route::{MatchKind, RouteEvent, RouteExtension, RouteKey, RouteUpdate};

/// Where the dispatcher is in handling one packet. Emitted on the trace
/// level so a simulation run can be replayed decision by decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    ReceivedAbove,
    ReceivedBelow,
    LocalDecision,
    Reassembling,
    Unwrapping,
    Forwarding,
    Delivered,
    Dropped,
}

/// Routing control operations accepted from the upper layer.
pub enum ControlRequest {
    AddRoute {
        key: RouteKey,
        update: RouteUpdate,
        timeout: Option<f64>,
    },
    RemoveRoute {
        key: RouteKey,
        kind: MatchKind,
    },
    Graft {
        key: RouteKey,
        interfaces: InterfaceSet,
        extension: Option<RouteExtension>,
        timeout: Option<f64>,
    },
    Prune {
        key: RouteKey,
        interfaces: InterfaceSet,
        extension: Option<RouteExtension>,
        timeout: Option<f64>,
    },
}

/// What the upper layer hands down.
pub enum UpperMessage {
    /// An ordinary packet to route toward its destination.
    Packet(Packet),
    /// A packet to push out an explicit interface set, bypassing route
    /// resolution. With `exclusive` the set is inverted: every physical
    /// interface except the named ones.
    Send {
        packet: Packet,
        interfaces: InterfaceSet,
        exclusive: bool,
    },
    /// A routing table manipulation.
    Control(ControlRequest),
}

/// What the dispatcher asks the surrounding node to do.
#[derive(Debug, Clone)]
pub enum Action {
    /// Hand the packet to the link under `iface`.
    Transmit { iface: InterfaceId, packet: Packet },
    /// Hand the packet to the upper-layer port bound to `protocol`.
    Deliver { protocol: ProtocolId, packet: Packet },
    /// The packet was discarded; `reason` matches the log line.
    Drop { packet: Packet, reason: String },
    /// A routing table entry changed.
    RouteChanged(RouteEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use simnet_core::{Address, Body};

    #[test]
    fn test_action_debug_is_compact() {
        let p = Packet::new(Address(1), Address(2), ProtocolId(6), 0, Body::Empty);
        let action = Action::Drop {
            packet: p,
            reason: "no route".into(),
        };
        let rendered = format!("{action:?}");
        assert!(rendered.contains("no route"));
    }
}
