//! Event system for UI decoupling.
//!
//! Lets the CLI (or any other front end) observe the session lifecycle and
//! the device's diagnostics without the core logging directly to a terminal.

use std::fmt;
use std::net::SocketAddr;

/// Lifecycle stages of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Discovery,
    Pairing,
    Connecting,
    Ready,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Discovery => write!(f, "Discovery"),
            SessionPhase::Pairing => write!(f, "Pairing"),
            SessionPhase::Connecting => write!(f, "Connecting"),
            SessionPhase::Ready => write!(f, "Ready"),
        }
    }
}

/// Events emitted while an operation runs.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Phase changed.
    PhaseChanged { to: SessionPhase },
    /// Discovery settled on a device.
    DeviceFound {
        device_id: String,
        name: String,
        address: SocketAddr,
    },
    /// Pairing produced new credentials.
    Paired { device_id: String },
    /// Authenticated session is open.
    Connected { device_id: String },
    /// Diagnostic text surfaced by the device connection.
    Debug { message: String },
    /// Fatal or device-reported error. `detail` carries the full chain.
    Error { message: String, detail: String },
    /// Key command acknowledged.
    KeySent { key: String },
    /// Passcode recovery finished entering one code.
    PasscodeAttempt { code: String },
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait SessionObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SessionEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::PhaseChanged { to } => {
                tracing::debug!(phase = %to, "Phase changed");
            }
            SessionEvent::DeviceFound {
                device_id,
                name,
                address,
            } => {
                tracing::info!(device_id = %device_id, name = %name, address = %address, "Device found");
            }
            SessionEvent::Paired { device_id } => {
                tracing::info!(device_id = %device_id, "Paired");
            }
            SessionEvent::Connected { device_id } => {
                tracing::debug!(device_id = %device_id, "Session open");
            }
            SessionEvent::Debug { message } => {
                tracing::debug!("{}", message);
            }
            SessionEvent::Error { message, detail } => {
                tracing::error!("{}", message);
                tracing::debug!("{}", detail);
            }
            SessionEvent::KeySent { key } => {
                tracing::debug!(key = %key, "Key acknowledged");
            }
            SessionEvent::PasscodeAttempt { code } => {
                tracing::info!("Trying {}", code);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Observer that keeps every event for assertions.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<SessionEvent>>,
    }

    impl RecordingObserver {
        pub fn errors(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    SessionEvent::Error { message, .. } => Some(message.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn debug_messages(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    SessionEvent::Debug { message } => Some(message.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn attempts(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    SessionEvent::PasscodeAttempt { code } => Some(code.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl SessionObserver for RecordingObserver {
        fn on_event(&self, event: &SessionEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
