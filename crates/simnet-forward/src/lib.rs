//! Packet forwarding engine for the simnet discrete-event simulator.
//!
//! The engine is purely reactive: packets come in from an upper layer or
//! an interface together with the current virtual time, and every
//! decision leaves as an [`Action`](dispatch::Action). Timers live on the
//! host's virtual clock; nothing here sleeps or does I/O.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fragment;
pub mod identity;
pub mod logging;
pub mod route;
pub mod switching;
pub mod timer;
pub mod vif;

pub use cache::RouteCache;
pub use config::ForwardConfig;
pub use dispatch::{Action, ControlRequest, LookupAssist, PacketDispatcher, UpperMessage};
pub use error::{ConfigError, DispatchError, FragmentError, RoutingError};
pub use fragment::{fragment, FragmentKey, ReassemblyEngine};
pub use identity::{Identity, StaticIdentity};
pub use route::{
    AddressPattern, MatchKind, RouteEntry, RouteEvent, RouteEventKind, RouteExtension, RouteKey,
    RouteUpdate, RoutingTable,
};
pub use switching::{LabelSwitchTable, SwitchTable};
pub use vif::{VifEntry, VifTable};
