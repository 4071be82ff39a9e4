use bytes::{Buf, BufMut, Bytes};

use crate::postgres::ProtocolError;

/// Integer signess in postgres docs is awful.
pub trait UsizeExt {
    /// Length is `usize` in rust, while sometime postgres want `u32`,
    /// this will panic when overflow instead of wrapping.
    fn to_u32(self) -> u32;
    /// Length is `usize` in rust, while sometime postgres want `u16`,
    /// this will panic when overflow instead of wrapping.
    fn to_u16(self) -> u16;
}

/// Nul string operation.
pub trait StrExt {
    /// String length plus nul (1).
    fn nul_string_len(&self) -> u32;
}

/// Nul string operation in [`BufMut`]
pub trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

/// Checked reads on a backend message body.
///
/// Backend bodies are untrusted input, every read reports truncation as
/// [`ProtocolError`] instead of panicking like plain [`Buf`] getters do.
pub trait BytesExt {
    /// Fail unless at least `len` bytes remain.
    fn ensure(&self, len: usize, message: &'static str) -> Result<(), ProtocolError>;

    /// Read nul terminated bytes, nul excluded.
    fn get_nul_bytes(&mut self, message: &'static str) -> Result<Bytes, ProtocolError>;

    /// Read nul terminated utf8 string.
    fn get_nul_string(&mut self, message: &'static str) -> Result<String, ProtocolError>;
}

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl UsizeExt for usize {
    fn to_u32(self) -> u32 {
        self.try_into().expect("message size too large for protocol")
    }

    fn to_u16(self) -> u16 {
        self.try_into().expect("message size too large for protocol")
    }
}

impl StrExt for str {
    fn nul_string_len(&self) -> u32 {
        self.len().to_u32() + 1/* nul */
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

impl BytesExt for Bytes {
    fn ensure(&self, len: usize, message: &'static str) -> Result<(), ProtocolError> {
        match self.remaining() < len {
            true => Err(ProtocolError::malformed(message)),
            false => Ok(()),
        }
    }

    fn get_nul_bytes(&mut self, message: &'static str) -> Result<Bytes, ProtocolError> {
        let Some(end) = self.iter().position(|e| matches!(e, b'\0')) else {
            return Err(ProtocolError::malformed(message));
        };
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        Ok(me)
    }

    fn get_nul_string(&mut self, message: &'static str) -> Result<String, ProtocolError> {
        let bytes = self.get_nul_bytes(message)?;
        String::from_utf8(bytes.into()).map_err(|_| ProtocolError::malformed(message))
    }
}

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nul_string() {
        let mut body = Bytes::from_static(b"user\0alice\0");
        assert_eq!(body.get_nul_string("test").unwrap(), "user");
        assert_eq!(body.get_nul_string("test").unwrap(), "alice");
        assert!(body.is_empty());
        assert!(body.get_nul_string("test").is_err());
    }

    #[test]
    fn unterminated() {
        let mut body = Bytes::from_static(b"user");
        assert!(body.get_nul_bytes("test").is_err());
        assert!(body.ensure(5, "test").is_err());
        assert!(body.ensure(4, "test").is_ok());
    }

    #[test]
    fn lossy() {
        assert_eq!(b"a\x00b c".lossy().to_string(), "a\\x00b c");
    }
}
