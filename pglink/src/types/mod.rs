//! Postgres values and their wire codecs.
//!
//! Every parameter and column travels as a [`Value`]. The [`TypeRegistry`]
//! maps each value kind to an oid, a [`PgFormat`][crate::postgres::PgFormat]
//! and an encoder, and each column oid to a decoder.
//!
//! Available value types:
//!
//! - rust primitives, [`String`] and [`Vec<u8>`]
//! - [`time`][::time]'s [`Date`], [`Time`], [`PrimitiveDateTime`] and [`OffsetDateTime`]
//! - [`Interval`]
//! - [`serde_json::Value`] and [`Json`], requires `json` feature
//! - nested arrays of the above, see [`Value::array`]
use std::fmt;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

mod error;
mod registry;
mod scalar;
mod temporal;
mod array;

#[cfg(feature = "json")]
mod json;
#[cfg(feature = "json")]
pub use json::Json;

pub use error::{DecodeError, EncodeError};
pub use registry::{Decoder, Encoder, InEntry, Inspector, OutEntry, TypeRegistry};

/// Postgres value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    /// Arbitrary precision number in its decimal text form.
    Numeric(String),
    Text(String),
    Bytea(Vec<u8>),
    Date(PgDate),
    Time(Time),
    /// `infinity` and `-infinity` are [`PrimitiveDateTime::MAX`] and [`PrimitiveDateTime::MIN`].
    Timestamp(PrimitiveDateTime),
    /// Sent normalized to UTC, received in UTC.
    TimestampTz(OffsetDateTime),
    Interval(Interval),
    #[cfg(feature = "json")]
    Json(serde_json::Value),
    /// Possibly nested array, every leaf must be of the same kind.
    Array(Vec<Value>),
}

/// Postgres `date`, which has infinities besides calendar dates.
///
/// [`Date::MAX`] is an ordinary date here, it is never sent as `infinity`.
///
/// ```
/// use pglink::{FromValue, PgDate, Value};
/// use time::Date;
///
/// let value = Value::from(PgDate::PositiveInfinity);
/// assert!(Date::from_value(&value).is_err());
/// assert_eq!(PgDate::from_value(&value).unwrap(), PgDate::PositiveInfinity);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PgDate {
    Value(Date),
    PositiveInfinity,
    NegativeInfinity,
}

impl From<Date> for PgDate {
    fn from(value: Date) -> Self {
        PgDate::Value(value)
    }
}

/// Discriminant of [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Bytea,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    #[cfg(feature = "json")]
    Json,
    Array,
}

/// Postgres `interval`.
///
/// Months and days are kept apart from the time part, as postgres does,
/// because their length in time depends on the date they apply to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl Interval {
    pub const fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self { months, days, microseconds }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int2(_) => ValueKind::Int2,
            Value::Int4(_) => ValueKind::Int4,
            Value::Int8(_) => ValueKind::Int8,
            Value::Float4(_) => ValueKind::Float4,
            Value::Float8(_) => ValueKind::Float8,
            Value::Numeric(_) => ValueKind::Numeric,
            Value::Text(_) => ValueKind::Text,
            Value::Bytea(_) => ValueKind::Bytea,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::TimestampTz(_) => ValueKind::TimestampTz,
            Value::Interval(_) => ValueKind::Interval,
            #[cfg(feature = "json")]
            Value::Json(_) => ValueKind::Json,
            Value::Array(_) => ValueKind::Array,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Collect an array value.
    ///
    /// ```
    /// use pglink::Value;
    ///
    /// let matrix = Value::array([Value::array([1, 2]), Value::array([3, 4])]);
    /// assert_eq!(matrix, Value::Array(vec![
    ///     Value::Array(vec![Value::Int4(1), Value::Int4(2)]),
    ///     Value::Array(vec![Value::Int4(3), Value::Int4(4)]),
    /// ]));
    /// ```
    pub fn array<I>(items: I) -> Value
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Integer family value widened to `i64`.
    pub(crate) fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Int2(v) => Some(v.into()),
            Value::Int4(v) => Some(v.into()),
            Value::Int8(v) => Some(v),
            _ => None,
        }
    }
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int2 => "int2",
            ValueKind::Int4 => "int4",
            ValueKind::Int8 => "int8",
            ValueKind::Float4 => "float4",
            ValueKind::Float8 => "float8",
            ValueKind::Numeric => "numeric",
            ValueKind::Text => "text",
            ValueKind::Bytea => "bytea",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::Timestamp => "timestamp",
            ValueKind::TimestampTz => "timestamptz",
            ValueKind::Interval => "interval",
            #[cfg(feature = "json")]
            ValueKind::Json => "json",
            ValueKind::Array => "array",
        }
    }

    pub(crate) fn is_integer(self) -> bool {
        matches!(self, ValueKind::Int2 | ValueKind::Int4 | ValueKind::Int8)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! into_value {
    ($($ty:ty => $variant:ident $(($conv:expr))?;)*) => {$(
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant($(($conv))?(value))
            }
        }
    )*};
}

into_value! {
    bool => Bool;
    i16 => Int2;
    i32 => Int4;
    i64 => Int8;
    f32 => Float4;
    f64 => Float8;
    String => Text;
    &str => Text(String::from);
    Vec<u8> => Bytea;
    &[u8] => Bytea(<[u8]>::to_vec);
    Date => Date(PgDate::Value);
    PgDate => Date;
    Time => Time;
    PrimitiveDateTime => Timestamp;
    OffsetDateTime => TimestampTz;
    Interval => Interval;
}

#[cfg(feature = "json")]
into_value! {
    serde_json::Value => Json;
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A type that can be extracted from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, DecodeError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}

macro_rules! from_value {
    ($ty:ty, $($pat:pat => $e:expr),* $(,)?) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self, DecodeError> {
                match value {
                    $($pat => Ok($e),)*
                    Value::Null => Err(DecodeError::Null),
                    other => Err(DecodeError::Mismatch {
                        expected: stringify!($ty),
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

from_value!(bool, Value::Bool(v) => *v);
from_value!(i16, Value::Int2(v) => *v);
from_value!(i32, Value::Int2(v) => (*v).into(), Value::Int4(v) => *v);
from_value!(i64, Value::Int2(v) => (*v).into(), Value::Int4(v) => (*v).into(), Value::Int8(v) => *v);
from_value!(f32, Value::Float4(v) => *v);
from_value!(f64, Value::Float4(v) => (*v).into(), Value::Float8(v) => *v);
from_value!(String, Value::Text(v) | Value::Numeric(v) => v.clone());
from_value!(Vec<u8>, Value::Bytea(v) => v.clone());
from_value!(PgDate, Value::Date(v) => *v);

impl FromValue for Date {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        match PgDate::from_value(value)? {
            PgDate::Value(date) => Ok(date),
            PgDate::PositiveInfinity | PgDate::NegativeInfinity => Err(DecodeError::OutOfRange("date")),
        }
    }
}
from_value!(Time, Value::Time(v) => *v);
from_value!(PrimitiveDateTime, Value::Timestamp(v) => *v);
from_value!(OffsetDateTime, Value::TimestampTz(v) => *v);
from_value!(Interval, Value::Interval(v) => *v);
from_value!(Vec<Value>, Value::Array(v) => v.clone());

#[cfg(feature = "json")]
from_value!(serde_json::Value, Value::Json(v) => v.clone());
