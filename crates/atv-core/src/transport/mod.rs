//! Transport layer module.

pub mod discovery;
pub mod handshake;
pub mod mock;
pub mod network;
pub mod tcp;
pub mod traits;

pub use discovery::UdpDiscovery;
pub use mock::{MockBackend, MockCall, MockSession};
pub use network::NetworkBackend;
pub use tcp::TcpSession;
pub use traits::{
    Ack, Connector, DeviceHandle, DeviceSession, Discovery, DiscoveryQuery, Pairing,
    TransportError,
};
