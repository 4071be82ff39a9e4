//! Postgres Backend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{Buf, Bytes};

use super::{DatabaseError, Oid, ProtocolError};
use crate::ext::BytesExt;

/// A type that can be decoded into postgres backend message
pub trait BackendProtocol: Sized {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError>;
}

/// Postgres backend messages
#[derive(Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    CopyData(CopyData),
    CopyDone(CopyDone),
    CopyInResponse(CopyInResponse),
    CopyOutResponse(CopyOutResponse),
    DataRow(DataRow),
    ErrorResponse(ErrorResponse),
    EmptyQueryResponse(EmptyQueryResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get message name from message type.
            ///
            /// Returns `"Unknown"` for unknown message type.
            pub fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    _ => "Unknown",
                }
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::unknown(msgtype)),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    Authentication,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    CopyData,
    CopyDone,
    CopyInResponse,
    CopyOutResponse,
    DataRow,
    ErrorResponse,
    EmptyQueryResponse,
    NegotiateProtocolVersion,
    NoData,
    NoticeResponse,
    NotificationResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(ProtocolError::unexpected(Self::MSGTYPE,$typ))
        }
    };
}

/// Authentication request, the request code selects the variant.
///
/// Only [`Ok`][Authentication::Ok] and [`MD5Password`][Authentication::MD5Password]
/// are answered by this driver, the rest are kept to report which method the
/// server asked for.
#[derive(Debug)]
pub enum Authentication {
    Ok,
    KerberosV5,
    CleartextPassword,
    MD5Password { salt: [u8; 4] },
    GSS,
    GSSContinue { data: Bytes },
    SSPI,
    /// Nul separated mechanism names, terminated by an empty name.
    SASL { mechanisms: Bytes },
    SASLContinue { data: Bytes },
    SASLFinal { data: Bytes },
}

impl Authentication {
    pub const MSGTYPE: u8 = b'R';

    /// Human readable authentication method name.
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::KerberosV5 => "Kerberos V5",
            Self::CleartextPassword => "cleartext password",
            Self::MD5Password { .. } => "MD5 password",
            Self::GSS | Self::GSSContinue { .. } => "GSSAPI",
            Self::SSPI => "SSPI",
            Self::SASL { .. } | Self::SASLContinue { .. } | Self::SASLFinal { .. } => "SASL",
        }
    }
}

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        body.ensure(4, "Authentication")?;
        let auth = match body.get_u32() {
            0 => Authentication::Ok,
            2 => Authentication::KerberosV5,
            3 => Authentication::CleartextPassword,
            5 => {
                body.ensure(4, "AuthenticationMD5Password")?;
                Authentication::MD5Password { salt: body.get_u32().to_be_bytes() }
            },
            7 => Authentication::GSS,
            8 => Authentication::GSSContinue { data: body },
            9 => Authentication::SSPI,
            10 => Authentication::SASL { mechanisms: body },
            11 => Authentication::SASLContinue { data: body },
            12 => Authentication::SASLFinal { data: body },
            auth => return Err(ProtocolError::unknown_auth(auth)),
        };
        Ok(auth)
    }
}

/// Cancellation key of the backend serving a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    pub process_id: u32,
    pub secret_key: u32,
}

impl BackendKeyData {
    pub const MSGTYPE: u8 = b'K';
}

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        body.ensure(8, "BackendKeyData")?;
        Ok(Self {
            process_id: body.get_u32(),
            secret_key: body.get_u32(),
        })
    }
}

/// Server parameter report, sent at startup and whenever a reported setting changes.
#[derive(Debug)]
pub struct ParameterStatus {
    pub name: String,
    pub value: String,
}

impl ParameterStatus {
    pub const MSGTYPE: u8 = b'S';
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            name: body.get_nul_string("ParameterStatus")?,
            value: body.get_nul_string("ParameterStatus")?,
        })
    }
}

/// Notice, same field layout as [`ErrorResponse`].
#[derive(Debug)]
pub struct NoticeResponse(pub DatabaseError);

impl NoticeResponse {
    pub const MSGTYPE: u8 = b'N';
}

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        DatabaseError::parse(body).map(Self)
    }
}

/// Server error, a list of `(code, string)` fields parsed into [`DatabaseError`].
#[derive(Debug)]
pub struct ErrorResponse(pub DatabaseError);

impl ErrorResponse {
    pub const MSGTYPE: u8 = b'E';
}

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        DatabaseError::parse(body).map(Self)
    }
}

/// `NOTIFY` delivered to a channel this session listens on.
#[derive(Debug)]
pub struct NotificationResponse {
    pub process_id: u32,
    pub channel: String,
    pub payload: String,
}

impl NotificationResponse {
    pub const MSGTYPE: u8 = b'A';
}

impl BackendProtocol for NotificationResponse {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        body.ensure(4, "NotificationResponse")?;
        Ok(Self {
            process_id: body.get_u32(),
            channel: body.get_nul_string("NotificationResponse")?,
            payload: body.get_nul_string("NotificationResponse")?,
        })
    }
}

/// Single field of a [`RowDescription`].
#[derive(Debug, Clone)]
pub struct FieldDescription {
    /// The field name.
    pub name: String,
    /// If the field can be identified as a column of a specific table,
    /// the object ID of the table; otherwise zero.
    pub table_oid: Oid,
    /// If the field can be identified as a column of a specific table,
    /// the attribute number of the column; otherwise zero.
    pub attribute: i16,
    /// The object ID of the field's data type.
    pub type_oid: Oid,
    /// The data type size (see pg_type.typlen).
    /// Note that negative values denote variable-width types.
    pub type_size: i16,
    /// The type modifier (see pg_attribute.atttypmod).
    /// The meaning of the modifier is type-specific.
    pub type_modifier: i32,
    /// The format code being used for the field.
    ///
    /// In a RowDescription returned from the statement variant of Describe,
    /// the format code is not yet known and will always be zero.
    pub format: u16,
}

/// Column list of a statement or portal.
#[derive(Debug)]
pub struct RowDescription {
    pub fields: Vec<FieldDescription>,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        body.ensure(2, "RowDescription")?;

        let len = body.get_u16();
        let mut fields = Vec::with_capacity(len as usize);

        for _ in 0..len {
            let name = body.get_nul_string("RowDescription")?;
            body.ensure(18, "RowDescription")?;
            fields.push(FieldDescription {
                name,
                table_oid: body.get_u32(),
                attribute: body.get_i16(),
                type_oid: body.get_u32(),
                type_size: body.get_i16(),
                type_modifier: body.get_i32(),
                format: body.get_u16(),
            });
        }

        Ok(Self { fields })
    }
}

/// One result row, values kept undecoded until [`Row`][crate::Row] is built.
#[derive(Debug)]
pub struct DataRow {
    pub column_len: u16,
    /// For each column, `Int32` length (-1 for NULL) followed by the value bytes.
    pub body: Bytes,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        body.ensure(2, "DataRow")?;
        Ok(Self {
            column_len: body.get_u16(),
            body,
        })
    }
}

/// End of a command, the tag names the command and, for some, a row count.
///
/// `INSERT` tags are `INSERT 0 rows`, the legacy oid word is always zero.
#[derive(Debug)]
pub struct CommandComplete {
    pub tag: String,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';

    /// Row count carried by the command tag.
    ///
    /// Returns [`None`] for commands whose tag carries no count.
    pub fn rows(&self) -> Option<u64> {
        let mut words = self.tag.split_whitespace();
        let count = match words.next()? {
            "INSERT" => words.nth(1)?,
            "SELECT" | "UPDATE" | "DELETE" | "MERGE" | "FETCH" | "MOVE" | "COPY" => words.next()?,
            _ => return None,
        };
        count.parse().ok()
    }

    /// The first word of the command tag.
    pub fn command(&self) -> &str {
        self.tag.split_whitespace().next().unwrap_or_default()
    }
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            tag: body.get_nul_string("CommandComplete")?,
        })
    }
}

/// Server supports an older minor version or rejects some `_pq_.` options.
#[derive(Debug)]
pub struct NegotiateProtocolVersion {
    pub minor: u32,
    pub unrecognized: u32,
    /// Nul terminated option names.
    pub options: Bytes,
}

impl NegotiateProtocolVersion {
    pub const MSGTYPE: u8 = b'v';
}

impl BackendProtocol for NegotiateProtocolVersion {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        body.ensure(8, "NegotiateProtocolVersion")?;
        Ok(Self {
            minor: body.get_u32(),
            unrecognized: body.get_u32(),
            options: body,
        })
    }
}

/// Parameter types the server resolved for a statement.
#[derive(Debug)]
pub struct ParameterDescription {
    pub oids: Vec<Oid>,
}

impl ParameterDescription {
    pub const MSGTYPE: u8 = b't';
}

impl BackendProtocol for ParameterDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        body.ensure(2, "ParameterDescription")?;
        let len = body.get_u16() as usize;
        body.ensure(len * 4, "ParameterDescription")?;
        Ok(Self {
            oids: (0..len).map(|_| body.get_u32()).collect(),
        })
    }
}

/// Current backend transaction status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// `I` if idle (not in a transaction block).
    Idle,
    /// `T` if in a transaction block.
    Transaction,
    /// `E` if in a failed transaction block (queries will be rejected until block is ended).
    Failed,
}

/// End of a command cycle.
#[derive(Debug)]
pub struct ReadyForQuery {
    pub status: TransactionStatus,
}

impl ReadyForQuery {
    pub const MSGTYPE: u8 = b'Z';
}

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        body.ensure(1, "ReadyForQuery")?;
        let status = match body.get_u8() {
            b'I' => TransactionStatus::Idle,
            b'T' => TransactionStatus::Transaction,
            b'E' => TransactionStatus::Failed,
            _ => return Err(ProtocolError::malformed("ReadyForQuery")),
        };
        Ok(Self { status })
    }
}

#[derive(Debug)]
pub struct CopyData {
    pub data: Bytes,
}

impl CopyData {
    pub const MSGTYPE: u8 = b'd';
}

impl BackendProtocol for CopyData {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { data: body })
    }
}

macro_rules! copy_response {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name {
            /// Overall format, `0` text or `1` binary.
            pub format: u8,
            pub column_formats: Vec<u16>,
        }

        impl $name {
            pub const MSGTYPE: u8 = $ty;
        }

        impl BackendProtocol for $name {
            fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
                assert_msgtype!(msgtype);
                body.ensure(3, stringify!($name))?;
                let format = body.get_u8();
                let len = body.get_u16() as usize;
                body.ensure(len * 2, stringify!($name))?;
                Ok(Self {
                    format,
                    column_formats: (0..len).map(|_| body.get_u16()).collect(),
                })
            }
        }
    )*};
}

copy_response! {
    /// Server waits for `CopyData`, ended by `CopyDone` or `CopyFail`.
    struct CopyInResponse, b'G';

    /// Server is about to stream `CopyData` until `CopyDone`.
    struct CopyOutResponse, b'H';
}

/// Messages without a body.
macro_rules! empty_msg {
    ($($(#[$doc:meta])* $name:ident = $ty:literal;)*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name;

        impl $name {
            pub const MSGTYPE: u8 = $ty;
        }

        impl BackendProtocol for $name {
            fn decode(msgtype: u8, _: Bytes) -> Result<Self, ProtocolError> {
                assert_msgtype!(msgtype);
                Ok(Self)
            }
        }
    )*};
}

empty_msg! {
    BindComplete = b'2';
    CloseComplete = b'3';
    CopyDone = b'c';
    /// Sent instead of `CommandComplete` for an empty query string.
    EmptyQueryResponse = b'I';
    /// Describe of a statement that returns no rows.
    NoData = b'n';
    ParseComplete = b'1';
    /// `Execute` reached its row limit, the portal can be resumed.
    PortalSuspended = b's';
}
