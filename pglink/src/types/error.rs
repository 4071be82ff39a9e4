use std::{borrow::Cow, fmt, str::Utf8Error, string::FromUtf8Error};

use super::ValueKind;

/// An error when encoding a parameter value.
///
/// Raised before any byte of the command is written.
pub enum EncodeError {
    /// Array has no non-null element to infer its type from.
    ArrayContentEmpty,
    /// Array leaves are of different kinds.
    ArrayContentNotHomogeneous,
    /// Sibling sub-arrays differ in length or nesting depth.
    ArrayDimensionsNotConsistent,
    /// Value does not fit the wire type.
    OutOfRange {
        kind: ValueKind,
        target: &'static str,
    },
    /// Encoder was handed a value of another kind.
    Mismatch {
        expected: &'static str,
        found: ValueKind,
    },
    /// Failed to serialize using `serde_json`.
    #[cfg(feature = "json")]
    Json(serde_json::Error),
}

impl std::error::Error for EncodeError { }

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to encode value, ")?;
        match self {
            Self::ArrayContentEmpty => f.write_str("array has no non-null element"),
            Self::ArrayContentNotHomogeneous => f.write_str("array elements are not of the same type"),
            Self::ArrayDimensionsNotConsistent => f.write_str("array dimensions are not consistent"),
            Self::OutOfRange { kind, target } => write!(f, "{kind} value out of range for `{target}`"),
            Self::Mismatch { expected, found } => write!(f, "expected {expected} found {found}"),
            #[cfg(feature = "json")]
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Debug for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row value.
pub enum DecodeError {
    /// Postgres return non utf8 string.
    Utf8(Utf8Error),
    /// Column requested not found.
    ColumnNotFound(Cow<'static,str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Row is null.
    Null,
    /// Requested rust type does not match the value kind.
    Mismatch {
        expected: &'static str,
        found: ValueKind,
    },
    /// Fixed size value with unexpected length.
    InvalidLength {
        ty: &'static str,
        expected: usize,
        found: usize,
    },
    /// Value is outside of what the rust type can represent.
    OutOfRange(&'static str),
    /// Value bytes are not in the expected layout.
    Malformed(&'static str),
    /// Failed to deserialize using `serde_json`.
    #[cfg(feature = "json")]
    Json(serde_json::error::Error),
    /// Error from a caller registered decoder, passed through unchanged.
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl DecodeError {
    /// Wrap an error from a custom decoder.
    pub fn custom(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Custom(error.into())
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Self::Custom(e) = self {
            return e.fmt(f);
        }
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::Null => write!(f, "unexpected NULL value"),
            Self::Mismatch { expected, found } => write!(f, "expected {expected} found {found}"),
            Self::InvalidLength { ty, expected, found } => {
                write!(f, "`{ty}` expected {expected} bytes found {found}")
            }
            Self::OutOfRange(ty) => write!(f, "`{ty}` value out of range"),
            Self::Malformed(ty) => write!(f, "malformed `{ty}` value"),
            #[cfg(feature = "json")]
            Self::Json(e) => write!(f, "{e}"),
            Self::Custom(_) => Ok(()),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));
#[cfg(feature = "json")]
from!(<serde_json::error::Error>e => Self::Json(e));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
