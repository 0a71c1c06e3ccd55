//! LAN backend: UDP discovery plus TCP pairing and sessions.

use std::io;
use std::sync::Arc;

use super::discovery::UdpDiscovery;
use super::tcp::{self, TcpSession};
use super::traits::{
    Connector, DeviceHandle, Discovery, DiscoveryQuery, Pairing, TransportError,
};
use crate::config::ClientConfig;
use crate::credentials::Credential;
use crate::error::RemoteError;
use crate::events::SessionObserver;

type PinSource = Box<dyn Fn() -> io::Result<String> + Send + Sync>;

/// Production backend.
pub struct NetworkBackend {
    config: ClientConfig,
    discovery: UdpDiscovery,
    pin: PinSource,
}

impl NetworkBackend {
    /// `pin` is called during pairing to obtain the code the device shows.
    pub fn new<F>(config: ClientConfig, pin: F) -> Self
    where
        F: Fn() -> io::Result<String> + Send + Sync + 'static,
    {
        let discovery = UdpDiscovery::new(config.discovery_port);
        Self {
            config,
            discovery,
            pin: Box::new(pin),
        }
    }
}

impl Discovery for NetworkBackend {
    fn browse(&self, query: &DiscoveryQuery) -> Result<Vec<DeviceHandle>, TransportError> {
        self.discovery.browse(query)
    }
}

impl Pairing for NetworkBackend {
    fn pair(
        &self,
        device: &DeviceHandle,
        observer: &dyn SessionObserver,
    ) -> Result<Credential, RemoteError> {
        tcp::pair(
            device,
            self.config.connect_timeout(),
            self.config.response_timeout(),
            &*self.pin,
            observer,
        )
    }
}

impl Connector for NetworkBackend {
    type Session = TcpSession;

    fn open_connection(
        &self,
        device: &DeviceHandle,
        credential: &Credential,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<TcpSession, RemoteError> {
        TcpSession::open(
            device,
            credential,
            self.config.connect_timeout(),
            self.config.response_timeout(),
            observer,
        )
    }
}
