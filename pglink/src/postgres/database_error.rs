//! Field-coded `ErrorResponse` and `NoticeResponse` body.
//!
//! <https://www.postgresql.org/docs/current/protocol-error-fields.html>
use bytes::{Buf, Bytes};
use std::fmt;

use super::ProtocolError;
use crate::ext::BytesExt;

/// Message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Panic,
    Fatal,
    Error,
    Warning,
    Notice,
    Debug,
    Info,
    Log,
}

impl Severity {
    /// Returns `true` for `ERROR`, `FATAL` and `PANIC`.
    pub fn is_error(self) -> bool {
        matches!(self, Self::Panic | Self::Fatal | Self::Error)
    }

    fn parse(value: &str) -> Option<Severity> {
        let severity = match value {
            "PANIC" => Self::Panic,
            "FATAL" => Self::Fatal,
            "ERROR" => Self::Error,
            "WARNING" => Self::Warning,
            "NOTICE" => Self::Notice,
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "LOG" => Self::Log,
            _ => return None,
        };
        Some(severity)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Panic => "PANIC",
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Notice => "NOTICE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Log => "LOG",
        }
    }
}

/// Error or notice reported by the server.
///
/// Fields of unrecognized type are kept and reachable through [`DatabaseError::get`].
#[derive(Clone)]
pub struct DatabaseError {
    severity: Severity,
    code: String,
    message: String,
    fields: Vec<(u8, String)>,
}

impl DatabaseError {
    /// Parse `ErrorResponse` or `NoticeResponse` body.
    pub(crate) fn parse(mut body: Bytes) -> Result<DatabaseError, ProtocolError> {
        let mut fields = vec![];

        loop {
            body.ensure(1, "ErrorResponse")?;
            let code = body.get_u8();
            if code == b'\0' {
                break;
            }
            let value = String::from_utf8_lossy(&body.get_nul_bytes("ErrorResponse")?).into_owned();
            fields.push((code, value));
        }

        let field = |code: u8| fields.iter().find(|(c, _)| *c == code).map(|(_, v)| v.as_str());

        // `V` is never localized, `S` is for servers older than 9.6
        let severity = field(b'V')
            .or_else(|| field(b'S'))
            .and_then(Severity::parse)
            .unwrap_or(Severity::Log);
        let code = field(b'C').unwrap_or_default().to_owned();
        let message = field(b'M').unwrap_or_default().to_owned();

        Ok(Self { severity, code, message, fields })
    }

    /// Raw field value by its field type code.
    pub fn get(&self, code: u8) -> Option<&str> {
        self.fields.iter().find(|(c, _)| *c == code).map(|(_, v)| v.as_str())
    }

    /// Every field as received, in order.
    pub fn fields(&self) -> &[(u8, String)] {
        &self.fields
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The SQLSTATE code for the error.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The primary human-readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// An optional secondary error message carrying more detail about the problem.
    pub fn detail(&self) -> Option<&str> {
        self.get(b'D')
    }

    /// An optional suggestion what to do about the problem.
    pub fn hint(&self) -> Option<&str> {
        self.get(b'H')
    }

    /// Error cursor position as an index into the original query string, counted in characters from 1.
    pub fn position(&self) -> Option<u32> {
        self.get(b'P').and_then(|e| e.parse().ok())
    }

    /// Cursor position into an internally generated command.
    pub fn internal_position(&self) -> Option<u32> {
        self.get(b'p').and_then(|e| e.parse().ok())
    }

    /// The text of a failed internally-generated command.
    pub fn internal_query(&self) -> Option<&str> {
        self.get(b'q')
    }

    /// Call stack traceback of active procedural language functions or internally-generated queries.
    pub fn r#where(&self) -> Option<&str> {
        self.get(b'W')
    }

    pub fn schema(&self) -> Option<&str> {
        self.get(b's')
    }

    pub fn table(&self) -> Option<&str> {
        self.get(b't')
    }

    pub fn column(&self) -> Option<&str> {
        self.get(b'c')
    }

    pub fn data_type(&self) -> Option<&str> {
        self.get(b'd')
    }

    pub fn constraint(&self) -> Option<&str> {
        self.get(b'n')
    }

    /// The file name of the source-code location where the error was reported.
    pub fn file(&self) -> Option<&str> {
        self.get(b'F')
    }

    /// The line number of the source-code location where the error was reported.
    pub fn line(&self) -> Option<u32> {
        self.get(b'L').and_then(|e| e.parse().ok())
    }

    /// The name of the source-code routine reporting the error.
    pub fn routine(&self) -> Option<&str> {
        self.get(b'R')
    }
}

impl std::error::Error for DatabaseError { }

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.severity.as_str(), self.message, self.code)?;
        if let Some(detail) = self.detail() {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = self.hint() {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseError")
            .field("severity", &self.severity)
            .field("code", &self.code)
            .field("message", &self.message)
            .field("detail", &self.detail())
            .field("hint", &self.hint())
            .field("position", &self.position())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_error_fields() {
        let body = Bytes::from_static(
            b"SERROR\0VERROR\0C42P01\0Mrelation \"missing\" does not exist\0P15\0Fparse_relation.c\0L1449\0RparserOpenTable\0\0",
        );
        let err = DatabaseError::parse(body).unwrap();
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(err.code(), "42P01");
        assert_eq!(err.message(), "relation \"missing\" does not exist");
        assert_eq!(err.position(), Some(15));
        assert_eq!(err.line(), Some(1449));
        assert_eq!(err.routine(), Some("parserOpenTable"));
        assert_eq!(err.detail(), None);
        assert_eq!(err.to_string(), "ERROR: relation \"missing\" does not exist (42P01)");
    }

    #[test]
    fn localized_severity_fallback() {
        let body = Bytes::from_static(b"SWARNING\0C01000\0Mcareful\0\0");
        let err = DatabaseError::parse(body).unwrap();
        assert_eq!(err.severity(), Severity::Warning);
        assert!(!err.severity().is_error());
    }

    #[test]
    fn unknown_fields_kept() {
        let body = Bytes::from_static(b"VNOTICE\0C00000\0Mhi\0Zfuture\0\0");
        let err = DatabaseError::parse(body).unwrap();
        assert_eq!(err.get(b'Z'), Some("future"));
        assert_eq!(err.fields().len(), 4);
    }

    #[test]
    fn missing_terminator() {
        assert!(DatabaseError::parse(Bytes::from_static(b"VERROR\0")).is_err());
    }
}
