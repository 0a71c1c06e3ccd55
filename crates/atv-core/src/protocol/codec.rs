//! Length-prefixed frame codec.
//!
//! ```text
//! [len:4 big-endian][JSON body:len]
//! ```

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use super::constants::MAX_FRAME_LEN;
use super::messages::Frame;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Malformed frame body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Encode a frame including its length prefix.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut buf = Vec::with_capacity(4 + body.len());
    buf.write_u32::<BigEndian>(body.len() as u32)?;
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<(), CodecError> {
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame, blocking until it is complete.
///
/// A clean EOF before the length prefix is reported as [`CodecError::Closed`].
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, CodecError> {
    let len = match reader.read_u32::<BigEndian>() {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(CodecError::Closed),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_prefix_matches_body() {
        let bytes = encode_frame(&Frame::Debug {
            message: "hi".into(),
        })
        .unwrap();
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(len, bytes.len() - 4);
    }

    #[test]
    fn test_read_sequence_then_closed() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Ack { id: 1, error: None }).unwrap();
        write_frame(&mut buf, &Frame::Ack { id: 2, error: None }).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Frame::Ack { id: 1, error: None }
        );
        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Frame::Ack { id: 2, error: None }
        );
        assert!(matches!(read_frame(&mut cursor), Err(CodecError::Closed)));
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>((MAX_FRAME_LEN + 1) as u32).unwrap();
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_truncated_body() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(10).unwrap();
        buf.extend_from_slice(b"{\"ty");
        let mut cursor = Cursor::new(buf);
        assert!(matches!(read_frame(&mut cursor), Err(CodecError::Io(_))));
    }

    #[test]
    fn test_garbage_body() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(3).unwrap();
        buf.extend_from_slice(b"abc");
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(CodecError::Malformed(_))
        ));
    }
}
