//! Message envelope.
//!
//! Every message after startup is `tag(1) + length(4) + body`, where length
//! counts itself but not the tag.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Read;

use super::ProtocolError;
use crate::{Result, ext::UsizeExt};

/// Message type byte plus length.
pub const HEADER_LEN: usize = 1 + 4;

/// Read one complete backend message, returns its tag and body.
///
/// Blocks until the whole body arrived.
pub fn read_message<R: Read + ?Sized>(reader: &mut R) -> Result<(u8, Bytes)> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;

    let mut header = &header[..];
    let tag = header.get_u8();
    let len = header.get_u32();

    if len < 4 {
        return Err(ProtocolError::InvalidLength { len }.into());
    }

    let mut body = BytesMut::zeroed(len as usize - 4);
    reader.read_exact(&mut body)?;

    Ok((tag, body.freeze()))
}

/// Write one message with raw `payload` into `buf`.
pub fn write_message(buf: &mut BytesMut, tag: u8, payload: &[u8]) {
    buf.reserve(HEADER_LEN + payload.len());
    buf.put_u8(tag);
    buf.put_u32(4 + payload.len().to_u32());
    buf.put_slice(payload);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn roundtrip() {
        let mut buf = BytesMut::new();
        write_message(&mut buf, b'd', b"1\tfoo\n");
        assert_eq!(&buf[..], b"d\0\0\0\x0a1\tfoo\n");

        let (tag, body) = read_message(&mut &buf[..]).unwrap();
        assert_eq!(tag, b'd');
        assert_eq!(&body[..], b"1\tfoo\n");
    }

    #[test]
    fn empty_body() {
        let (tag, body) = read_message(&mut &b"Z\0\0\0\x04"[..]).unwrap();
        assert_eq!(tag, b'Z');
        assert!(body.is_empty());
    }

    #[test]
    fn length_too_small() {
        let err = read_message(&mut &b"Z\0\0\0\x03"[..]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(ProtocolError::InvalidLength { len: 3 })));
    }

    #[test]
    fn truncated() {
        let err = read_message(&mut &b"C\0\0\0\x0aSEL"[..]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));
    }
}
