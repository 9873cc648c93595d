//! Packet dispatch: the orchestrator over routing, caching,
//! fragmentation, switching and tunneling.

pub mod engine;
pub mod types;

pub use engine::{LookupAssist, PacketDispatcher};
pub use types::{Action, ControlRequest, DispatchPhase, UpperMessage};
