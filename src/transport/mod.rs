//! Transport layer - connection establishment and lifecycle coordination.

mod connector;
mod state;

pub use connector::{Connector, Duplex};
pub use state::{DisconnectCoordinator, DisconnectNotice};
