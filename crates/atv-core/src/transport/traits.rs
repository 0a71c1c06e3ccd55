//! Transport seams consumed by the session orchestrator.
//!
//! Discovery, pairing and the authenticated connection are collaborators:
//! the orchestrator only relies on these traits, so the network backend and
//! the mock backend are interchangeable.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::credentials::Credential;
use crate::error::RemoteError;
use crate::events::SessionObserver;
use crate::protocol::{CodecError, KeyCode, QueueRequest};
use crate::subscription::{EventKind, Subscription};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {addr}: {message}")]
    ConnectFailed { addr: SocketAddr, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Timeout after {timeout_ms}ms waiting for {waiting_for}")]
    Timeout {
        timeout_ms: u64,
        waiting_for: &'static str,
    },

    #[error("Unexpected frame: expected {expected}, got {actual}")]
    UnexpectedFrame {
        expected: &'static str,
        actual: String,
    },

    #[error("Device reported error: {0}")]
    Device(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A device found on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub device_id: String,
    pub name: String,
    pub address: SocketAddr,
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.name, self.device_id, self.address)
    }
}

/// What discovery should look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryQuery {
    /// Only devices with this identifier match.
    pub target: Option<String>,
    pub timeout: Duration,
    /// Stop browsing once this many matches are in.
    pub limit: Option<usize>,
}

/// Protocol-level acknowledgement of a key command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub id: u32,
}

/// Finds devices on the local network.
pub trait Discovery {
    /// Every match that answered within the query's timeout, in answer order.
    fn browse(&self, query: &DiscoveryQuery) -> Result<Vec<DeviceHandle>, TransportError>;
}

/// Performs the one-time pairing handshake.
pub trait Pairing {
    fn pair(
        &self,
        device: &DeviceHandle,
        observer: &dyn SessionObserver,
    ) -> Result<Credential, RemoteError>;
}

/// Opens authenticated sessions.
pub trait Connector {
    type Session: DeviceSession;

    /// Fails with [`RemoteError::AuthenticationRejected`] when the device
    /// refuses the credential.
    fn open_connection(
        &self,
        device: &DeviceHandle,
        credential: &Credential,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self::Session, RemoteError>;
}

/// One open, authenticated channel to a device.
pub trait DeviceSession {
    fn device_id(&self) -> &str;

    /// Press and release a key, waiting for the device to acknowledge.
    fn send_key_command(&mut self, key: KeyCode) -> Result<Ack, TransportError>;

    /// Press and release without waiting for acknowledgement.
    fn send_key_press_and_release(&mut self, usage_page: u16, usage: u16)
    -> Result<(), TransportError>;

    /// One playback-queue request, one raw response.
    fn request_playback_queue(&mut self, request: &QueueRequest) -> Result<Value, TransportError>;

    /// Start receiving one class of pushed events.
    fn subscribe(&mut self, kind: EventKind) -> Result<Subscription, TransportError>;

    /// Release the connection. Idempotent.
    fn close(&mut self);
}
