#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Reconnecting websocket transport: backoff reconnect, connection timeout,
//! a clonable event surface, and ready-state queries. Every worker's public
//! and private sockets are one of these.

mod backoff;
mod socket;
mod transport;

pub use backoff::TransportOpts;
pub use socket::{Connector, Socket, WsConnector};
pub use transport::{ReadyState, ReconnectingTransport, TransportError, TransportEvent};
