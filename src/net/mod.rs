//! OS-independent datagram I/O and the `Connection` abstraction built on it.

pub mod connection;
pub mod socket;

pub use connection::{Connection, ConnectionType, DirectConnection, Endpoint, RelayConnection};
pub use socket::DatagramSocket;
