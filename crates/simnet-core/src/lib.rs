//! Core types for the simnet discrete-event network simulator.
//!
//! This crate defines the addressing newtypes, the interface bitset and
//! the simulated packet model shared by the forwarding engine and its
//! host components. It performs no I/O and holds no tables.

pub mod packet;
pub mod types;

pub use packet::{Body, Packet, PacketError, PacketFlags, DEFAULT_TTL};
pub use types::{Address, InterfaceId, InterfaceSet, Label, ProtocolId};
