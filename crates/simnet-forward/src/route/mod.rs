//! Routing: masked keys, the table and its change events.

pub mod entry;
pub mod key;
pub mod table;

pub use entry::{RouteEntry, RouteEvent, RouteEventKind, RouteExtension, RouteUpdate};
pub use key::{AddressPattern, MatchKind, RouteKey};
pub use table::RoutingTable;
