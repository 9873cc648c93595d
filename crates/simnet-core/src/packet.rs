//! The simulated packet model.
//!
//! Packets in the simulator carry bookkeeping sizes rather than real
//! octets: `header_len` and `payload_len` describe how large the packet
//! is on the simulated wire, while [`Body`] holds either opaque bytes, a
//! nested (tunnel-encapsulated) packet, or nothing at all. Fragmentation
//! follows the same convention: only the offset-zero fragment of a train
//! carries the captured body, every other fragment is size-only.

use core::fmt;

use crate::types::{Address, InterfaceId, Label, ProtocolId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet body is not raw bytes")]
    NotRaw,

    #[error("packet body is not an encapsulated packet")]
    NotEncapsulated,
}

/// Per-packet control flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags {
    /// Force local inspection at every hop, regardless of destination.
    pub router_alert: bool,
    /// Drop instead of fragmenting when the packet exceeds the MTU.
    pub dont_fragment: bool,
    /// This fragment is not the last of its train.
    pub more_fragments: bool,
    /// The body is a tunnel-encapsulated inner packet.
    pub tunnel: bool,
    /// Trace-route reply marker (requests have it clear).
    pub trace_reply: bool,
}

/// Packet body: opaque bytes, a nested packet, or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Body {
    /// No captured content (size-only fragments, pure bookkeeping packets).
    #[default]
    Empty,
    /// Opaque upper-layer bytes.
    Raw(Vec<u8>),
    /// A tunnel-encapsulated inner packet.
    Inner(Box<Packet>),
}

/// A packet travelling through the simulated network.
#[derive(Clone, PartialEq, Eq)]
#[must_use]
pub struct Packet {
    pub source: Address,
    pub destination: Address,
    pub protocol: ProtocolId,
    /// Hop budget. The packet dies when `hops` exceeds it.
    pub ttl: u8,
    /// Hops taken so far, incremented per forwarding step.
    pub hops: u8,
    /// Sequence id, stamped once at the originating node. Doubles as the
    /// fragment train id: re-fragmenting never mints a new one.
    pub seq: u64,
    pub flags: PacketFlags,
    /// Byte offset of this fragment within the original body.
    pub frag_offset: usize,
    /// Simulated header size in bytes.
    pub header_len: usize,
    /// Simulated payload size in bytes.
    pub payload_len: usize,
    /// Switching label, if the packet travels a label-switched path.
    pub label: Option<Label>,
    /// Interface the packet arrived on; `None` for locally originated.
    pub incoming: Option<InterfaceId>,
    pub body: Body,
}

impl Packet {
    /// Create a packet with default TTL, no flags and an unset sequence id.
    pub fn new(
        source: Address,
        destination: Address,
        protocol: ProtocolId,
        payload_len: usize,
        body: Body,
    ) -> Self {
        Self {
            source,
            destination,
            protocol,
            ttl: DEFAULT_TTL,
            hops: 0,
            seq: 0,
            flags: PacketFlags::default(),
            frag_offset: 0,
            header_len: 0,
            payload_len,
            label: None,
            incoming: None,
            body,
        }
    }

    /// Total simulated size on the wire.
    #[must_use]
    pub fn size(&self) -> usize {
        self.header_len + self.payload_len
    }

    /// Whether this packet is part of a fragment train.
    #[must_use]
    pub fn is_fragment(&self) -> bool {
        self.flags.more_fragments || self.frag_offset > 0
    }

    /// Whether this is an unanswered trace-route request.
    #[must_use]
    pub fn is_trace_request(&self) -> bool {
        self.protocol == ProtocolId::TRACEROUTE && !self.flags.trace_reply
    }

    /// Borrow the raw byte body.
    pub fn raw_body(&self) -> Result<&[u8], PacketError> {
        match &self.body {
            Body::Raw(bytes) => Ok(bytes),
            _ => Err(PacketError::NotRaw),
        }
    }

    /// Take the encapsulated inner packet out of the body.
    pub fn into_inner(self) -> Result<Packet, PacketError> {
        match self.body {
            Body::Inner(inner) => Ok(*inner),
            _ => Err(PacketError::NotEncapsulated),
        }
    }
}

/// Default hop budget for newly created packets.
pub const DEFAULT_TTL: u8 = 64;

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("src", &self.source)
            .field("dst", &self.destination)
            .field("proto", &self.protocol.0)
            .field("seq", &self.seq)
            .field("hops", &format_args!("{}/{}", self.hops, self.ttl))
            .field("off", &self.frag_offset)
            .field("len", &format_args!("{}+{}", self.header_len, self.payload_len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet() -> Packet {
        Packet::new(
            Address(1),
            Address(2),
            ProtocolId(17),
            100,
            Body::Raw(vec![0xAB; 100]),
        )
    }

    #[test]
    fn test_size() {
        let mut p = make_packet();
        p.header_len = 20;
        assert_eq!(p.size(), 120);
    }

    #[test]
    fn test_is_fragment() {
        let mut p = make_packet();
        assert!(!p.is_fragment());
        p.flags.more_fragments = true;
        assert!(p.is_fragment());
        p.flags.more_fragments = false;
        p.frag_offset = 980;
        assert!(p.is_fragment());
    }

    #[test]
    fn test_raw_body_accessor() {
        let p = make_packet();
        assert_eq!(p.raw_body().unwrap().len(), 100);
        assert_eq!(p.clone().into_inner().unwrap_err(), PacketError::NotEncapsulated);
    }

    #[test]
    fn test_into_inner() {
        let inner = make_packet();
        let mut outer = Packet::new(
            Address(10),
            Address(20),
            ProtocolId(4),
            inner.size(),
            Body::Inner(Box::new(inner.clone())),
        );
        outer.flags.tunnel = true;
        assert_eq!(outer.raw_body().unwrap_err(), PacketError::NotRaw);
        assert_eq!(outer.into_inner().unwrap(), inner);
    }

    #[test]
    fn test_packet_equality_is_total() {
        fn assert_full_eq<T: Eq>() {}
        assert_full_eq::<Body>();
        assert_full_eq::<Packet>();

        let a = make_packet();
        let mut b = a.clone();
        assert_eq!(a, b);
        b.hops = 1;
        assert_ne!(a, b);
    }

    #[test]
    fn test_trace_request_marker() {
        let mut p = make_packet();
        assert!(!p.is_trace_request());
        p.protocol = ProtocolId::TRACEROUTE;
        assert!(p.is_trace_request());
        p.flags.trace_reply = true;
        assert!(!p.is_trace_request());
    }
}
