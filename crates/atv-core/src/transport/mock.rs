//! In-process mock backend for testing.
//!
//! Plays every collaborator role at once: discovery answers from a fixed
//! device list, pairing hands out a fixed secret, and sessions record each
//! call with a timestamp.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use super::traits::{
    Ack, Connector, DeviceHandle, DeviceSession, Discovery, DiscoveryQuery, Pairing,
    TransportError,
};
use crate::credentials::Credential;
use crate::error::RemoteError;
use crate::events::{SessionEvent, SessionObserver};
use crate::protocol::{KeyCode, QueueRequest};
use crate::subscription::{DeviceEvent, EventHub, EventKind, Subscription};

/// A recorded interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Browse {
        target: Option<String>,
        limit: Option<usize>,
    },
    Pair {
        device_id: String,
    },
    Connect {
        device_id: String,
    },
    KeyCommand {
        usage_page: u16,
        usage: u16,
        hold: Option<Duration>,
    },
    KeyPress {
        usage_page: u16,
        usage: u16,
    },
    Queue(QueueRequest),
    Subscribe(EventKind),
    Close,
}

type CallLog = Arc<Mutex<Vec<(Instant, MockCall)>>>;

/// Mock backend for unit testing orchestration and operations.
pub struct MockBackend {
    devices: Vec<DeviceHandle>,
    secret: Vec<u8>,
    reject_auth: bool,
    pairing_failure: Option<String>,
    queue_response: Value,
    events: Vec<DeviceEvent>,
    diagnostics: Vec<String>,
    fail_after_sends: Option<usize>,
    log: CallLog,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            secret: vec![0x5a; 32],
            reject_auth: false,
            pairing_failure: None,
            queue_response: json!({ "queue": [] }),
            events: Vec::new(),
            diagnostics: Vec::new(),
            fail_after_sends: None,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a device that answers discovery.
    pub fn with_device(mut self, device_id: &str) -> Self {
        let port = 7000 + self.devices.len() as u16;
        self.devices.push(DeviceHandle {
            device_id: device_id.to_string(),
            name: format!("Mock {device_id}"),
            address: SocketAddr::from(([127, 0, 0, 1], port)),
        });
        self
    }

    /// Refuse every connection attempt.
    pub fn rejecting_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }

    pub fn failing_pairing(mut self, reason: &str) -> Self {
        self.pairing_failure = Some(reason.to_string());
        self
    }

    pub fn with_queue_response(mut self, response: Value) -> Self {
        self.queue_response = response;
        self
    }

    /// Events a subscription replays before its stream ends.
    pub fn with_events(mut self, events: Vec<DeviceEvent>) -> Self {
        self.events = events;
        self
    }

    /// Debug text the device reports while connecting.
    pub fn with_diagnostic(mut self, message: &str) -> Self {
        self.diagnostics.push(message.to_string());
        self
    }

    /// Let `n` key sends succeed, then fail every following one.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after_sends = Some(n);
        self
    }

    /// Credential this backend's devices accept.
    pub fn credential_for(&self, device_id: &str) -> Credential {
        Credential {
            device_id: device_id.to_string(),
            client_id: "mock-client".into(),
            public_key: vec![0x01; 32],
            secret: self.secret.clone(),
        }
    }

    /// All recorded calls in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Recorded calls with the instant each happened.
    pub fn timed_calls(&self) -> Vec<(Instant, MockCall)> {
        self.log.lock().unwrap().clone()
    }

    pub fn network_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Browse { .. } | MockCall::Connect { .. } | MockCall::Pair { .. }))
            .count()
    }

    fn record(&self, call: MockCall) {
        self.log.lock().unwrap().push((Instant::now(), call));
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Discovery for MockBackend {
    fn browse(&self, query: &DiscoveryQuery) -> Result<Vec<DeviceHandle>, TransportError> {
        self.record(MockCall::Browse {
            target: query.target.clone(),
            limit: query.limit,
        });
        let matches = self
            .devices
            .iter()
            .filter(|d| query.target.as_ref().is_none_or(|t| *t == d.device_id))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matches)
    }
}

impl Pairing for MockBackend {
    fn pair(
        &self,
        device: &DeviceHandle,
        observer: &dyn SessionObserver,
    ) -> Result<Credential, RemoteError> {
        self.record(MockCall::Pair {
            device_id: device.device_id.clone(),
        });
        observer.on_event(&SessionEvent::Debug {
            message: format!("pairing with {}", device.device_id),
        });
        if let Some(reason) = &self.pairing_failure {
            return Err(RemoteError::HandshakeFailed(reason.clone()));
        }
        Ok(self.credential_for(&device.device_id))
    }
}

impl Connector for MockBackend {
    type Session = MockSession;

    fn open_connection(
        &self,
        device: &DeviceHandle,
        credential: &Credential,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<MockSession, RemoteError> {
        self.record(MockCall::Connect {
            device_id: device.device_id.clone(),
        });
        for message in &self.diagnostics {
            observer.on_event(&SessionEvent::Debug {
                message: message.clone(),
            });
        }

        if self.reject_auth {
            return Err(RemoteError::AuthenticationRejected("pairing revoked".into()));
        }
        if credential.device_id != device.device_id {
            return Err(RemoteError::AuthenticationRejected(format!(
                "device identifies as {}, credentials are for {}",
                device.device_id, credential.device_id
            )));
        }
        if credential.secret != self.secret {
            return Err(RemoteError::AuthenticationRejected("proof rejected".into()));
        }

        Ok(MockSession {
            device_id: device.device_id.clone(),
            log: self.log.clone(),
            queue_response: self.queue_response.clone(),
            events: self.events.clone(),
            hub: EventHub::new(),
            sends: 0,
            fail_after_sends: self.fail_after_sends,
            next_id: 0,
            closed: false,
        })
    }
}

/// Session handed out by [`MockBackend`].
pub struct MockSession {
    device_id: String,
    log: CallLog,
    queue_response: Value,
    events: Vec<DeviceEvent>,
    hub: EventHub,
    sends: usize,
    fail_after_sends: Option<usize>,
    next_id: u32,
    closed: bool,
}

impl MockSession {
    fn record(&self, call: MockCall) {
        self.log.lock().unwrap().push((Instant::now(), call));
    }

    fn check_send(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        if self.fail_after_sends.is_some_and(|n| self.sends >= n) {
            return Err(TransportError::WriteFailed("connection reset by peer".into()));
        }
        self.sends += 1;
        Ok(())
    }
}

impl DeviceSession for MockSession {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn send_key_command(&mut self, key: KeyCode) -> Result<Ack, TransportError> {
        self.check_send()?;
        self.record(MockCall::KeyCommand {
            usage_page: key.usage_page,
            usage: key.usage,
            hold: key.hold,
        });
        self.next_id += 1;
        Ok(Ack { id: self.next_id })
    }

    fn send_key_press_and_release(
        &mut self,
        usage_page: u16,
        usage: u16,
    ) -> Result<(), TransportError> {
        self.check_send()?;
        self.record(MockCall::KeyPress { usage_page, usage });
        Ok(())
    }

    fn request_playback_queue(&mut self, request: &QueueRequest) -> Result<Value, TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        self.record(MockCall::Queue(*request));
        Ok(self.queue_response.clone())
    }

    fn subscribe(&mut self, kind: EventKind) -> Result<Subscription, TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        self.record(MockCall::Subscribe(kind));
        let subscription = self.hub.subscribe(kind);
        for event in &self.events {
            self.hub.publish(event.clone());
        }
        // Scripted stream ends like a dropped connection would.
        self.hub.close();
        Ok(subscription)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.hub.close();
            self.record(MockCall::Close);
        }
    }
}
