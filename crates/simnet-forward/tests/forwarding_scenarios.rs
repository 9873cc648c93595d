//! End-to-end forwarding scenarios exercising the dispatcher as a whole
//! node: routing, caching, fragmentation, reassembly and tunneling.

use simnet_core::{Address, Body, InterfaceId, InterfaceSet, Packet, ProtocolId};
use simnet_forward::config::VifPack;
use simnet_forward::config::VifPackEntry;
use simnet_forward::{
    Action, ControlRequest, ForwardConfig, MatchKind, PacketDispatcher, RouteKey, RouteUpdate,
    StaticIdentity, UpperMessage,
};

const PROTO: ProtocolId = ProtocolId(17);

fn make_node(address: u64, config: ForwardConfig) -> PacketDispatcher<StaticIdentity> {
    let mut node = PacketDispatcher::new(config, StaticIdentity::new(Address(address)));
    node.register_port(PROTO);
    node
}

fn routing_config(interfaces: u32) -> ForwardConfig {
    ForwardConfig {
        interfaces,
        ..ForwardConfig::default()
    }
}

fn make_packet(source: u64, destination: u64, payload: usize) -> Packet {
    let mut p = Packet::new(
        Address(source),
        Address(destination),
        PROTO,
        payload,
        Body::Raw(vec![0x5A; payload]),
    );
    p.header_len = 20;
    p.seq = 1;
    p
}

fn make_set(ifaces: &[u32]) -> InterfaceSet {
    ifaces.iter().map(|i| InterfaceId(*i)).collect()
}

fn add_route(node: &mut PacketDispatcher<StaticIdentity>, key: RouteKey, out: &[u32]) {
    let _ = node.from_upper(
        UpperMessage::Control(ControlRequest::AddRoute {
            key,
            update: RouteUpdate::interfaces(make_set(out)),
            timeout: None,
        }),
        0.0,
    );
}

fn transmitted(actions: &[Action]) -> Vec<(InterfaceId, Packet)> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Transmit { iface, packet } => Some((*iface, packet.clone())),
            _ => None,
        })
        .collect()
}

fn delivered(actions: &[Action]) -> Vec<Packet> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Deliver { packet, .. } => Some(packet.clone()),
            _ => None,
        })
        .collect()
}

// A transit router with a destination route forwards an arriving packet
// out the routed interface with the hop count bumped.
#[test]
fn transit_forwarding_follows_route() {
    let mut router = make_node(0xD, routing_config(3));
    add_route(&mut router, RouteKey::for_destination(Address(0xB)), &[2]);

    let packet = make_packet(0xA, 0xB, 100);
    let actions = router.from_lower(InterfaceId(0), packet.clone(), 0.0);

    let out = transmitted(&actions);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, InterfaceId(2));
    assert_eq!(out[0].1.destination, packet.destination);
    assert_eq!(out[0].1.hops, packet.hops + 1);
    assert_eq!(out[0].1.payload_len, packet.payload_len);
}

// A more specific key beats a wider one; packets the specific key does
// not match fall back to the wide entry.
#[test]
fn longest_match_prefers_specific_key() {
    let mut router = make_node(0xD, routing_config(4));
    add_route(&mut router, RouteKey::for_destination(Address(0xB)), &[3]);
    add_route(
        &mut router,
        RouteKey::concrete(Address(0xA), Address(0xB), InterfaceId(0)),
        &[2],
    );

    let actions = router.from_lower(InterfaceId(0), make_packet(0xA, 0xB, 100), 0.0);
    assert_eq!(transmitted(&actions)[0].0, InterfaceId(2));

    let actions = router.from_lower(InterfaceId(1), make_packet(0xA, 0xB, 100), 0.0);
    assert_eq!(transmitted(&actions)[0].0, InterfaceId(3));
}

// Caching must not change forwarding outcomes while the table holds the
// entry, and a cached resolution keeps serving after the entry is gone.
#[test]
fn route_cache_is_transparent_and_never_invalidated() {
    let cached_config = routing_config(3);
    let uncached_config = ForwardConfig {
        route_cache: false,
        ..routing_config(3)
    };
    let mut cached = make_node(0xD, cached_config);
    let mut uncached = make_node(0xD, uncached_config);

    let key = RouteKey::for_destination(Address(0xB));
    add_route(&mut cached, key, &[2]);
    add_route(&mut uncached, key, &[2]);

    for _ in 0..2 {
        let a = cached.from_lower(InterfaceId(0), make_packet(0xA, 0xB, 100), 0.0);
        let b = uncached.from_lower(InterfaceId(0), make_packet(0xA, 0xB, 100), 0.0);
        let ifaces = |acts: &[Action]| {
            transmitted(acts)
                .iter()
                .map(|(i, _)| i.0)
                .collect::<Vec<_>>()
        };
        assert_eq!(ifaces(&a), ifaces(&b));
    }

    // Remove the route. The uncached node loses reachability at once;
    // the cached node keeps forwarding from its stale entry.
    for node in [&mut cached, &mut uncached] {
        let _ = node.from_upper(
            UpperMessage::Control(ControlRequest::RemoveRoute {
                key,
                kind: MatchKind::Exact,
            }),
            1.0,
        );
    }

    let a = cached.from_lower(InterfaceId(0), make_packet(0xA, 0xB, 100), 1.0);
    assert_eq!(transmitted(&a).len(), 1);

    let b = uncached.from_lower(InterfaceId(0), make_packet(0xA, 0xB, 100), 1.0);
    assert!(matches!(
        &b[..],
        [Action::Drop { reason, .. }] if reason == "no route"
    ));
}

// A large packet is fragmented at the egress MTU and reassembled by the
// destination node, which delivers the original payload size upward.
#[test]
fn fragmentation_roundtrip_across_nodes() {
    let mut sender = make_node(0xA, ForwardConfig {
        mtu: 120,
        ..routing_config(2)
    });
    add_route(&mut sender, RouteKey::for_destination(Address(0xB)), &[1]);

    let actions = sender.from_upper(UpperMessage::Packet(make_packet(0xA, 0xB, 300)), 0.0);
    let fragments = transmitted(&actions);
    assert_eq!(fragments.len(), 3);
    assert!(fragments.iter().all(|(_, p)| p.size() <= 120));

    let mut receiver = make_node(0xB, routing_config(2));
    let mut got = Vec::new();
    for (i, (_, fragment)) in fragments.into_iter().enumerate() {
        let actions = receiver.from_lower(InterfaceId(0), fragment, 0.1 * i as f64);
        got.extend(delivered(&actions));
    }

    assert_eq!(got.len(), 1);
    assert_eq!(got[0].payload_len, 300);
    assert!(!got[0].is_fragment());
    assert_eq!(got[0].raw_body().expect("body travels in the head").len(), 300);
}

// An incomplete train times out; the same train resent in full after the
// timeout reassembles from scratch.
#[test]
fn reassembly_timeout_discards_partial_train() {
    let mut sender = make_node(0xA, ForwardConfig {
        mtu: 120,
        ..routing_config(2)
    });
    add_route(&mut sender, RouteKey::for_destination(Address(0xB)), &[1]);
    let actions = sender.from_upper(UpperMessage::Packet(make_packet(0xA, 0xB, 300)), 0.0);
    let fragments = transmitted(&actions);

    let mut receiver = make_node(0xB, ForwardConfig {
        fragment_ttl: 5.0,
        ..routing_config(2)
    });

    // Only the head arrives before the record expires.
    let head = fragments[0].1.clone();
    assert!(delivered(&receiver.from_lower(InterfaceId(0), head, 0.0)).is_empty());
    let _ = receiver.advance(6.0);

    // The tail of the stale train no longer completes anything.
    for (_, fragment) in &fragments[1..] {
        let actions = receiver.from_lower(InterfaceId(0), fragment.clone(), 6.5);
        assert!(delivered(&actions).is_empty());
    }

    // A full retransmission reassembles normally.
    let mut got = Vec::new();
    for (_, fragment) in &fragments {
        let actions = receiver.from_lower(InterfaceId(0), fragment.clone(), 7.0);
        got.extend(delivered(&actions));
    }
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].payload_len, 300);
}

// Traffic routed at a virtual interface is wrapped toward the vif's peer
// and unwrapped there, resuming as an arrival on the peer's own vif.
#[test]
fn vif_tunnel_roundtrip() {
    let sender_config = ForwardConfig {
        interfaces: 1,
        vif_enabled: true,
        vifs: vec![VifPack {
            start: 1,
            entries: vec![VifPackEntry {
                local: None,
                peer: Some(Address(0xB1)),
            }],
        }],
        ..ForwardConfig::default()
    };
    let mut sender = make_node(0xA1, sender_config);
    add_route(&mut sender, RouteKey::for_destination(Address(0xEE)), &[1]);
    add_route(&mut sender, RouteKey::for_destination(Address(0xB1)), &[0]);

    let actions = sender.from_upper(UpperMessage::Packet(make_packet(0xA1, 0xEE, 100)), 0.0);
    let out = transmitted(&actions);
    assert_eq!(out.len(), 1);
    let (iface, outer) = &out[0];
    assert_eq!(*iface, InterfaceId(0));
    assert_eq!(outer.source, Address(0xA1));
    assert_eq!(outer.destination, Address(0xB1));
    assert!(outer.flags.tunnel);

    let receiver_config = ForwardConfig {
        interfaces: 1,
        vif_enabled: true,
        vifs: vec![VifPack {
            start: 5,
            entries: vec![VifPackEntry {
                local: None,
                peer: Some(Address(0xA1)),
            }],
        }],
        ..ForwardConfig::default()
    };
    let mut receiver = PacketDispatcher::new(
        receiver_config,
        StaticIdentity::new(Address(0xB1)).with(Address(0xEE)),
    );
    receiver.register_port(PROTO);

    let actions = receiver.from_lower(InterfaceId(0), outer.clone(), 0.2);
    let got = delivered(&actions);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].destination, Address(0xEE));
    assert_eq!(got[0].payload_len, 100);
    assert_eq!(got[0].incoming, Some(InterfaceId(5)));
}

// Route expiry surfaces as a Removed event at the right virtual time and
// takes reachability with it.
#[test]
fn route_timeout_expires_on_schedule() {
    let mut router = make_node(0xD, routing_config(2));
    let key = RouteKey::for_destination(Address(0xB));
    let _ = router.from_upper(
        UpperMessage::Control(ControlRequest::AddRoute {
            key,
            update: RouteUpdate::interfaces(make_set(&[1])),
            timeout: Some(10.0),
        }),
        0.0,
    );

    let actions = router.from_lower(InterfaceId(0), make_packet(0xA, 0xB, 100), 9.0);
    assert_eq!(transmitted(&actions).len(), 1);

    let events = router.advance(10.5);
    assert!(matches!(&events[..], [Action::RouteChanged(_)]));

    // The cache is deliberately left alone, so bypass it to observe the
    // table: a node without the cache drops immediately.
    let mut uncached = make_node(0xD, ForwardConfig {
        route_cache: false,
        ..routing_config(2)
    });
    let _ = uncached.from_upper(
        UpperMessage::Control(ControlRequest::AddRoute {
            key,
            update: RouteUpdate::interfaces(make_set(&[1])),
            timeout: Some(10.0),
        }),
        0.0,
    );
    let _ = uncached.advance(10.5);
    let actions = uncached.from_lower(InterfaceId(0), make_packet(0xA, 0xB, 100), 11.0);
    assert!(matches!(&actions[..], [Action::Drop { .. }]));
}
