//! Wire messages exchanged with the device.
//!
//! Every frame body is a JSON object tagged by `type`. Binary fields travel
//! as lowercase hex.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters of a playback-queue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRequest {
    pub location: u32,
    pub length: u32,
    pub include_metadata: bool,
    pub include_lyrics: bool,
    pub include_language_options: bool,
}

impl Default for QueueRequest {
    fn default() -> Self {
        Self {
            location: 0,
            length: 1,
            include_metadata: false,
            include_lyrics: false,
            include_language_options: false,
        }
    }
}

/// Snapshot of what the device is playing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NowPlayingInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub app_bundle_identifier: Option<String>,
    pub playback_state: Option<String>,
    /// Seconds.
    pub duration: Option<f64>,
    /// Seconds.
    pub elapsed_time: Option<f64>,
}

impl NowPlayingInfo {
    fn progress(&self) -> String {
        match (self.elapsed_time, self.duration) {
            (Some(elapsed), Some(duration)) if duration > 0.0 => {
                format!(" ({} | {})", clock(elapsed), clock(duration))
            }
            _ => String::new(),
        }
    }
}

fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

impl fmt::Display for NowPlayingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let app = self.app_bundle_identifier.as_deref().unwrap_or("unknown");
        let state = self.playback_state.as_deref().unwrap_or("unknown");

        match (&self.title, &self.artist) {
            (Some(title), Some(artist)) => {
                let album = match &self.album {
                    Some(album) => format!(" -- {album}"),
                    None => String::new(),
                };
                write!(
                    f,
                    "{title}{album} by {artist}{} | {app} | {state}",
                    self.progress()
                )
            }
            (Some(title), None) => write!(f, "{title} | {app} | {state}"),
            _ => write!(f, "{app} | {state}"),
        }
    }
}

/// Any protocol message the device pushes, kept in raw form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub kind: String,
    #[serde(default)]
    pub body: Value,
}

/// Frame bodies, both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    // Pairing
    PairStart {
        client_id: String,
        public_key: String,
    },
    PairChallenge {
        device_id: String,
        public_key: String,
        salt: String,
    },
    PairVerify {
        proof: String,
    },
    PairResult {
        ok: bool,
        #[serde(default)]
        reason: Option<String>,
    },

    // Authenticated connect
    Hello {
        client_id: String,
        device_id: String,
    },
    Challenge {
        device_id: String,
        nonce: String,
    },
    Auth {
        proof: String,
    },
    AuthResult {
        ok: bool,
        #[serde(default)]
        reason: Option<String>,
    },

    // Commands
    Key {
        id: u32,
        usage_page: u16,
        usage: u16,
        pressed: bool,
    },
    Ack {
        id: u32,
        #[serde(default)]
        error: Option<String>,
    },
    Queue {
        id: u32,
        request: QueueRequest,
    },
    QueueResponse {
        id: u32,
        body: Value,
    },

    // Pushed by the device
    NowPlaying {
        info: NowPlayingInfo,
    },
    Message {
        message: ProtocolMessage,
    },
    Debug {
        message: String,
    },
    Error {
        message: String,
    },
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::PairStart { .. } => "pair_start",
            Frame::PairChallenge { .. } => "pair_challenge",
            Frame::PairVerify { .. } => "pair_verify",
            Frame::PairResult { .. } => "pair_result",
            Frame::Hello { .. } => "hello",
            Frame::Challenge { .. } => "challenge",
            Frame::Auth { .. } => "auth",
            Frame::AuthResult { .. } => "auth_result",
            Frame::Key { .. } => "key",
            Frame::Ack { .. } => "ack",
            Frame::Queue { .. } => "queue",
            Frame::QueueResponse { .. } => "queue_response",
            Frame::NowPlaying { .. } => "now_playing",
            Frame::Message { .. } => "message",
            Frame::Debug { .. } => "debug",
            Frame::Error { .. } => "error",
        }
    }
}

/// Discovery probe broadcast by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryProbe {
    #[serde(default)]
    pub target: Option<String>,
}

/// A device's answer to a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReply {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    pub port: u16,
}
