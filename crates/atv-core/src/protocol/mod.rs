//! Protocol module - keys, wire messages and frame codec.

pub mod codec;
pub mod constants;
pub mod keys;
pub mod messages;

pub use codec::{CodecError, read_frame, write_frame};
pub use constants::*;
pub use keys::{KeyCode, KeyCommand};
pub use messages::{Frame, NowPlayingInfo, ProtocolMessage, QueueRequest};
