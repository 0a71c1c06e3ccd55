//! ATV-Core: remote control for network media players.
//!
//! This crate pairs with a media player on the local network, keeps the
//! resulting credentials, and drives authenticated sessions that send
//! remote keys, read the playback queue and stream device events.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, key table, frame types, length-prefixed codec
//! - **Transport**: Discovery, pairing and session abstraction (LAN, mock)
//! - **Credentials**: Credential string format and the pairing record
//! - **Session**: Orchestrator running discovery, pair or connect, and a body
//! - **Events**: Observer pattern for UI decoupling
//! - **Subscription**: Typed streams of device-pushed events
//! - **Recovery**: Blind passcode search over the keypad
//!
//! # Example
//!
//! ```no_run
//! use atv_core::{ClientConfig, NetworkBackend, SessionOrchestrator, credentials, ops};
//! use atv_core::protocol::KeyCommand;
//!
//! let config = ClientConfig::default();
//! let record = credentials::PairingRecord::load_lenient(&config.pairing_file);
//! let credential = credentials::resolve(None, record.as_ref())?;
//!
//! let backend = NetworkBackend::new(config.clone(), || Ok("1234".to_string()));
//! let orchestrator = SessionOrchestrator::new(backend, config);
//! let observer = orchestrator.observer();
//! orchestrator.run(&credential, |session| {
//!     ops::send_command(session, KeyCommand::Menu, observer.as_ref())
//! })?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod ops;
pub mod protocol;
pub mod recovery;
pub mod session;
pub mod subscription;
pub mod transport;

// Re-exports for convenience
pub use config::{ClientConfig, DiscoveryPolicy};
pub use credentials::{Credential, CredentialError, PairingRecord};
pub use error::RemoteError;
pub use events::{NullObserver, SessionEvent, SessionObserver, SessionPhase, TracingObserver};
pub use recovery::{PasscodeAttempt, PasscodeRecovery};
pub use session::SessionOrchestrator;
pub use subscription::{DeviceEvent, EventKind, Subscription};
pub use transport::{DeviceSession, MockBackend, NetworkBackend, TransportError};
