use std::{fmt, io};

use crate::{postgres::Oid, types::ValueKind};

/// Driver misuse, or a state the caller must resolve.
pub enum InterfaceError {
    /// Operation on a closed connection.
    Closed,
    /// `close` called twice.
    AlreadyClosed,
    /// Prepared statement was explicitly closed.
    StatementClosed,
    /// Server answered `N` to the SSL request.
    SslRefused,
    /// SSL requested but the `tls` feature is disabled.
    TlsUnavailable,
    /// Server requested a password but none configured.
    PasswordRequired,
    /// Server entered COPY but no stream was supplied.
    MissingCopyStream {
        /// `"in"` or `"out"`.
        direction: &'static str,
    },
    /// Reading the copy-in source failed.
    CopySource(io::Error),
    /// Writing to the copy-out sink failed.
    CopySink(io::Error),
    /// Parameter count differs from the prepared statement.
    ParameterCount {
        expected: usize,
        found: usize,
    },
    /// Parameter kind differs from what the statement was prepared with.
    ParameterType {
        index: usize,
        expected: Oid,
        found: ValueKind,
    },
}

impl std::error::Error for InterfaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CopySource(e) | Self::CopySink(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for InterfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("connection is closed"),
            Self::AlreadyClosed => f.write_str("connection already closed"),
            Self::StatementClosed => f.write_str("prepared statement is closed"),
            Self::SslRefused => f.write_str("server refused SSL"),
            Self::TlsUnavailable => f.write_str("SSL requested but `tls` feature is disabled"),
            Self::PasswordRequired => f.write_str("server requested a password but none was configured"),
            Self::MissingCopyStream { direction } => {
                write!(f, "server started COPY {direction} but no stream was given")
            }
            Self::CopySource(e) => write!(f, "failed to read COPY source: {e}"),
            Self::CopySink(e) => write!(f, "failed to write COPY sink: {e}"),
            Self::ParameterCount { expected, found } => {
                write!(f, "statement expect {expected} parameters, found {found}")
            }
            Self::ParameterType { index, expected, found } => {
                write!(f, "parameter ${} prepared as oid {expected}, found {found}", index + 1)
            }
        }
    }
}

impl fmt::Debug for InterfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
