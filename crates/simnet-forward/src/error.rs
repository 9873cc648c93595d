//! Forwarding engine error types.
//!
//! Every error here is scoped to the packet or configuration call in
//! progress; nothing in this taxonomy terminates the simulation.

use simnet_core::{Address, InterfaceId, PacketError};

/// Configuration and explicit-request errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no such interface: {0:?}")]
    NoSuchInterface(InterfaceId),

    #[error("virtual interface {0} is not configured")]
    VifUnconfigured(u32),

    #[error("virtual interface {0} has no peer")]
    VifNoPeer(u32),

    #[error("bad configuration: {0}")]
    Invalid(String),
}

/// Routing failures, recovered locally by dropping the packet.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no route to {0}")]
    NoRoute(Address),

    #[error("false route entries")]
    ForwardingLoop,
}

/// Fragmentation failures abort only the triggering operation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FragmentError {
    #[error("header size {header} does not fit MTU {mtu}")]
    HeaderExceedsMtu { header: usize, mtu: usize },
}

/// Errors surfaced by the dispatcher itself.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("fragmentation error: {0}")]
    Fragment(#[from] FragmentError),

    #[error("unexpected message shape at port: {0}")]
    ProtocolMismatch(#[from] PacketError),

    #[error("tunnel source {0} matches no virtual interface")]
    UnknownTunnelPeer(Address),
}
