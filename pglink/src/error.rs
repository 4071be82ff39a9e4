//! `pglink` error types.
use std::{backtrace::Backtrace, borrow::Cow, fmt, io};

use crate::{
    connection::{InterfaceError, ParseError},
    postgres::{DatabaseError, ProtocolError},
    types::{DecodeError, EncodeError},
};

/// A specialized [`Result`] type for `pglink` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `pglink` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Prefix the error message with `context`.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Returns the server error, if this error is one.
    pub fn as_database(&self) -> Option<&DatabaseError> {
        match &self.kind {
            ErrorKind::Database(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if the driver was used incorrectly.
    pub fn is_interface(&self) -> bool {
        matches!(self.kind, ErrorKind::Interface(_))
    }

    /// Errors after which the wire can no longer be trusted.
    pub(crate) fn is_fatal(&self) -> bool {
        match self.kind {
            ErrorKind::Io(_) | ErrorKind::Protocol(_) => true,
            #[cfg(feature = "tls")]
            ErrorKind::Tls(_) => true,
            _ => false,
        }
    }
}

/// All possible error kind from `pglink` library.
pub enum ErrorKind {
    /// Invalid connection url.
    Config(ParseError),
    /// Driver misuse, e.g. operating on a closed connection.
    Interface(InterfaceError),
    /// Backend sent something the driver cannot understand.
    Protocol(ProtocolError),
    Io(io::Error),
    /// `ErrorResponse` from the server.
    Database(DatabaseError),
    NotSupported(NotSupported),
    Encode(EncodeError),
    Decode(DecodeError),
    #[cfg(feature = "tls")]
    Tls(native_tls::Error),
}

/// Feature the driver does not implement.
pub struct NotSupported {
    what: Cow<'static, str>,
}

impl NotSupported {
    pub(crate) fn new(what: impl Into<Cow<'static, str>>) -> Self {
        Self { what: what.into() }
    }

    /// Description of what is not supported.
    pub fn what(&self) -> &str {
        &self.what
    }
}

impl std::error::Error for NotSupported { }

impl fmt::Display for NotSupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not supported: {}", self.what)
    }
}

impl fmt::Debug for NotSupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<InterfaceError>e => ErrorKind::Interface(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<std::io::Error>e => ErrorKind::Io(e));
from!(<DatabaseError>e => ErrorKind::Database(e));
from!(<NotSupported>e => ErrorKind::NotSupported(e));
from!(<EncodeError>e => ErrorKind::Encode(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
#[cfg(feature = "tls")]
from!(<native_tls::Error>e => ErrorKind::Tls(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Interface(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::NotSupported(e) => e.fmt(f),
            Self::Encode(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            #[cfg(feature = "tls")]
            Self::Tls(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
