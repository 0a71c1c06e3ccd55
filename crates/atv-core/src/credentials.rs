//! Pairing credentials and their persisted record.
//!
//! A credential travels as an opaque string:
//!
//! ```text
//! <device-id>:<client-id>:<public-key-hex>:<secret-hex>
//! ```
//!
//! The same string is what `--credentials` accepts and what the pairing
//! record stores in its `data` field.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::RemoteError;

const FIELD_COUNT: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("expected {expected} ':'-separated fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("{field} is empty")]
    EmptyField { field: &'static str },

    #[error("{field} is not valid hex: {message}")]
    InvalidHex {
        field: &'static str,
        message: String,
    },
}

/// Long-lived material produced by pairing.
///
/// Immutable once built; the orchestrator only ever reads it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Stable identifier of the paired device.
    pub device_id: String,
    /// Identifier this client announced while pairing.
    pub client_id: String,
    /// Client public key used during pairing.
    pub public_key: Vec<u8>,
    /// Shared secret used to prove identity on connect.
    pub secret: Vec<u8>,
}

impl Credential {
    /// Parse the opaque credential string.
    pub fn parse(text: &str) -> Result<Self, CredentialError> {
        let parts: Vec<&str> = text.trim().split(':').collect();
        if parts.len() != FIELD_COUNT {
            return Err(CredentialError::FieldCount {
                expected: FIELD_COUNT,
                actual: parts.len(),
            });
        }

        Ok(Self {
            device_id: non_empty("device id", parts[0])?.to_string(),
            client_id: non_empty("client id", parts[1])?.to_string(),
            public_key: decode_hex("public key", parts[2])?,
            secret: decode_hex("secret", parts[3])?,
        })
    }

    /// Encode back into the opaque string form.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

// Keeps the secret out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("device_id", &self.device_id)
            .field("client_id", &self.client_id)
            .field("public_key", &hex::encode(&self.public_key))
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.device_id,
            self.client_id,
            hex::encode(&self.public_key),
            hex::encode(&self.secret)
        )
    }
}

impl FromStr for Credential {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn non_empty<'a>(field: &'static str, value: &'a str) -> Result<&'a str, CredentialError> {
    if value.is_empty() {
        Err(CredentialError::EmptyField { field })
    } else {
        Ok(value)
    }
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, CredentialError> {
    let value = non_empty(field, value)?;
    hex::decode(value).map_err(|e| CredentialError::InvalidHex {
        field,
        message: e.to_string(),
    })
}

/// Record persisted after a successful pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRecord {
    pub data: String,
}

impl PairingRecord {
    pub fn from_credential(credential: &Credential) -> Self {
        Self {
            data: credential.encode(),
        }
    }

    /// Load a record, treating absence or corruption as "no record".
    pub fn load_lenient<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No pairing record");
            return None;
        }

        match Self::load(path) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable pairing record");
                None
            }
        }
    }

    /// Load a record from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let record: PairingRecord = serde_json::from_str(&content)?;
        Ok(record)
    }

    /// Save the record as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Pick the credential for an authenticated operation.
///
/// An explicit string wins over the persisted record. Pure: no I/O.
pub fn resolve(
    explicit: Option<&str>,
    persisted: Option<&PairingRecord>,
) -> Result<Credential, RemoteError> {
    let text = match (explicit, persisted) {
        (Some(text), _) => text,
        (None, Some(record)) => record.data.as_str(),
        (None, None) => return Err(RemoteError::CredentialsRequired),
    };
    Ok(Credential::parse(text)?)
}
