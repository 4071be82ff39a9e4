//! Postgres Frontend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{BufMut, Bytes, BytesMut};

use super::{Oid, PgFormat};
use crate::ext::{BufMutExt, StrExt, UsizeExt};

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size_hint = msg.size_hint();
    buf.reserve(PREFIX + size_hint as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_u32(4 + size_hint);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size_hint as usize,
        "Frontend message body size not equal to size hint"
    );
}

/// A tagged message sent by the client.
pub trait FrontendProtocol {
    const MSGTYPE: u8;

    /// Exact body length, excluding the tag and the length field.
    fn size_hint(&self) -> u32;

    /// Write exactly [`size_hint`][FrontendProtocol::size_hint] bytes of body.
    fn encode(self, buf: impl BufMut);
}

/// First message of a session, untagged.
#[derive(Debug)]
pub struct Startup<'a> {
    pub user: &'a str,
    /// Server defaults to the user name.
    pub database: Option<&'a str>,
    pub application_name: Option<&'a str>,
}

impl Startup<'_> {
    /// Protocol 3.0, major version in the high 16 bits.
    pub const PROTOCOL_VERSION: u32 = 3 << 16;

    pub fn write(self, buf: &mut BytesMut) {
        let offset = buf.len();

        // length, patched below
        buf.put_u32(0);
        buf.put_u32(Self::PROTOCOL_VERSION);

        let params = [
            ("user", Some(self.user)),
            ("database", self.database),
            ("application_name", self.application_name),
        ];
        for (name, value) in params {
            if let Some(value) = value {
                buf.put_nul_string(name);
                buf.put_nul_string(value);
            }
        }
        buf.put_u8(b'\0');

        let len = (buf.len() - offset).to_u32();
        (&mut buf[offset..]).put_u32(len);
    }
}

/// Request to negotiate SSL before the startup message.
///
/// Like [`Startup`], it has no message-type byte. The server answers with a
/// single byte, `S` to proceed with the TLS handshake or `N` to refuse.
#[derive(Debug)]
pub struct SslRequest;

impl SslRequest {
    /// `1234` in the high 16 bits, `5679` in the low.
    pub const CODE: u32 = 1234 << 16 | 5679;

    pub fn write(self, buf: &mut BytesMut) {
        buf.put_u32(8);
        buf.put_u32(Self::CODE);
    }
}

/// Length of a `u16` count followed by `len` values of `width` bytes.
fn counted(len: usize, width: u32) -> u32 {
    2 + len.to_u32() * width
}

/// Password, already hashed when the server asked for MD5.
#[derive(Debug)]
pub struct PasswordMessage<'a> {
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> u32 {
        self.password.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.password);
    }
}

pub struct Parse<'a> {
    pub prepare_name: &'a str,
    pub sql: &'a str,
    /// Types of the leading parameters, zero or `unknown` leaves one to the server.
    pub oids: &'a [Oid],
}

impl FrontendProtocol for Parse<'_> {
    const MSGTYPE: u8 = b'P';

    fn size_hint(&self) -> u32 {
        self.prepare_name.nul_string_len()
            + self.sql.nul_string_len()
            + counted(self.oids.len(), 4)
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.prepare_name);
        buf.put_nul_string(self.sql);
        buf.put_u16(self.oids.len().to_u16());
        for &oid in self.oids {
            buf.put_u32(oid);
        }
    }
}

/// Ends an extended query cycle, the server answers with `ReadyForQuery`.
pub struct Sync;

impl FrontendProtocol for Sync {
    const MSGTYPE: u8 = b'S';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

/// Ask the server to send pending output without ending the cycle.
///
/// Cycles in this driver always end with [`Sync`], which flushes as well.
pub struct Flush;

impl FrontendProtocol for Flush {
    const MSGTYPE: u8 = b'H';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

pub struct Terminate;

impl FrontendProtocol for Terminate {
    const MSGTYPE: u8 = b'X';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

/// Create a portal from a prepared statement.
///
/// Formats are always sent one per parameter and one per result column.
pub struct Bind<'a> {
    pub portal_name: &'a str,
    pub stmt_name: &'a str,
    pub param_formats: &'a [PgFormat],
    /// [`None`] is sent as length `-1`, SQL NULL.
    pub params: &'a [Option<Bytes>],
    pub result_formats: &'a [PgFormat],
}

impl FrontendProtocol for Bind<'_> {
    const MSGTYPE: u8 = b'B';

    fn size_hint(&self) -> u32 {
        let params_size = self
            .params
            .iter()
            .map(|e| 4 + e.as_ref().map(|e| e.len().to_u32()).unwrap_or(0))
            .sum::<u32>();

        self.portal_name.nul_string_len()
            + self.stmt_name.nul_string_len()
            + counted(self.param_formats.len(), 2)
            + 2
            + params_size
            + counted(self.result_formats.len(), 2)
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_nul_string(self.stmt_name);

        buf.put_u16(self.param_formats.len().to_u16());
        for format in self.param_formats {
            buf.put_u16(format.format_code());
        }

        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            match param {
                Some(value) => {
                    buf.put_i32(value.len().to_u32() as i32);
                    buf.put_slice(value);
                }
                None => buf.put_i32(-1),
            }
        }

        buf.put_u16(self.result_formats.len().to_u16());
        for format in self.result_formats {
            buf.put_u16(format.format_code());
        }
    }
}

pub struct Execute<'a> {
    pub portal_name: &'a str,
    /// Zero for no limit.
    pub max_row: u32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn size_hint(&self) -> u32 {
        self.portal_name.nul_string_len() + 4
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_u32(self.max_row);
    }
}

pub struct Close<'a> {
    /// `S` for a statement, `P` for a portal.
    pub variant: u8,
    pub name: &'a str,
}

impl FrontendProtocol for Close<'_> {
    const MSGTYPE: u8 = b'C';

    fn size_hint(&self) -> u32 {
        1 + self.name.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(self.variant);
        buf.put_nul_string(self.name);
    }
}

pub struct Describe<'a> {
    /// `S` for a statement, `P` for a portal.
    pub kind: u8,
    pub name: &'a str,
}

impl FrontendProtocol for Describe<'_> {
    const MSGTYPE: u8 = b'D';

    fn size_hint(&self) -> u32 {
        1 + self.name.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(self.kind);
        buf.put_nul_string(self.name);
    }
}

/// Chunk of a copy-in stream, chunk boundaries carry no meaning.
pub struct CopyData<'a> {
    pub data: &'a [u8],
}

impl FrontendProtocol for CopyData<'_> {
    const MSGTYPE: u8 = b'd';

    fn size_hint(&self) -> u32 {
        self.data.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_slice(self.data);
    }
}

pub struct CopyDone;

impl FrontendProtocol for CopyDone {
    const MSGTYPE: u8 = b'c';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

/// Abort a copy-in, the server fails the command with `message`.
pub struct CopyFail<'a> {
    pub message: &'a str,
}

impl FrontendProtocol for CopyFail<'_> {
    const MSGTYPE: u8 = b'f';

    fn size_hint(&self) -> u32 {
        self.message.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.message);
    }
}
