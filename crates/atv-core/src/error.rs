//! Error taxonomy for remote-control operations.
//!
//! Every variant is fatal to the current invocation. Nothing at this layer
//! retries; callers log the error and exit.

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Invalid credential format: {0}")]
    InvalidCredentialFormat(#[from] CredentialError),

    #[error("Credentials are required. Pair first.")]
    CredentialsRequired,

    #[error("No device found{} within {}s", target_suffix(.target), .timeout_secs)]
    DeviceNotFound {
        target: Option<String>,
        timeout_secs: u64,
    },

    #[error("Found {} devices where exactly one was expected: {}", .ids.len(), .ids.join(", "))]
    AmbiguousDevice { ids: Vec<String> },

    #[error("Device rejected credentials: {0}")]
    AuthenticationRejected(String),

    #[error("Pairing handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] TransportError),
}

fn target_suffix(target: &Option<String>) -> String {
    match target {
        Some(id) => format!(" matching {id}"),
        None => String::new(),
    }
}
