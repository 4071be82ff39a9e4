//! Primitive codecs.
//!
//! Integers and floats use network byte order. Text-like values are their
//! utf8 bytes in both formats.
use bytes::{BufMut, BytesMut};

use super::{DecodeError, EncodeError, TypeRegistry, Value};

pub(super) fn mismatch(expected: &'static str, value: &Value) -> EncodeError {
    EncodeError::Mismatch { expected, found: value.kind() }
}

/// Check the length of a fixed size value.
pub(super) fn fixed<const N: usize>(ty: &'static str, bytes: &[u8]) -> Result<[u8; N], DecodeError> {
    bytes.try_into().map_err(|_| DecodeError::InvalidLength { ty, expected: N, found: bytes.len() })
}

/// NULL has no bytes, `Bind` writes its length as -1.
pub(super) fn encode_null(_: &TypeRegistry, _: &Value, _: &mut BytesMut) -> Result<(), EncodeError> {
    Ok(())
}

pub(super) fn encode_bool(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    match value {
        Value::Bool(v) => buf.put_u8(*v as u8),
        other => return Err(mismatch("bool", other)),
    }
    Ok(())
}

macro_rules! encode_int {
    ($($name:ident, $ty:ty, $target:literal, $put:ident;)*) => {$(
        /// Accepts any integer variant, narrowing it when in range.
        pub(super) fn $name(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
            let Some(int) = value.as_integer() else {
                return Err(mismatch("integer", value));
            };
            let int = <$ty>::try_from(int)
                .map_err(|_| EncodeError::OutOfRange { kind: value.kind(), target: $target })?;
            buf.$put(int);
            Ok(())
        }
    )*};
}

encode_int! {
    encode_int2, i16, "int2", put_i16;
    encode_int4, i32, "int4", put_i32;
    encode_int8, i64, "int8", put_i64;
}

pub(super) fn encode_float4(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    match value {
        Value::Float4(v) => buf.put_f32(*v),
        other => return Err(mismatch("float4", other)),
    }
    Ok(())
}

pub(super) fn encode_float8(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    match value {
        Value::Float4(v) => buf.put_f64((*v).into()),
        Value::Float8(v) => buf.put_f64(*v),
        other => return Err(mismatch("float8", other)),
    }
    Ok(())
}

/// Used for both `text` and `numeric`, the latter in its decimal text form.
pub(super) fn encode_text(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    match value {
        Value::Text(v) | Value::Numeric(v) => buf.put_slice(v.as_bytes()),
        other => return Err(mismatch("text", other)),
    }
    Ok(())
}

pub(super) fn encode_bytea(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    match value {
        Value::Bytea(v) => buf.put_slice(v),
        other => return Err(mismatch("bytea", other)),
    }
    Ok(())
}

pub(super) fn decode_bool(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    let [b] = fixed::<1>("bool", bytes)?;
    Ok(Value::Bool(b != 0))
}

pub(super) fn decode_int2(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Int2(i16::from_be_bytes(fixed("int2", bytes)?)))
}

pub(super) fn decode_int4(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Int4(i32::from_be_bytes(fixed("int4", bytes)?)))
}

pub(super) fn decode_int8(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Int8(i64::from_be_bytes(fixed("int8", bytes)?)))
}

/// `oid` is unsigned, widened so every value fits.
pub(super) fn decode_oid(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Int8(u32::from_be_bytes(fixed("oid", bytes)?).into()))
}

pub(super) fn decode_float4(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Float4(f32::from_be_bytes(fixed("float4", bytes)?)))
}

pub(super) fn decode_float8(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Float8(f64::from_be_bytes(fixed("float8", bytes)?)))
}

pub(super) fn decode_bytea(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Bytea(bytes.to_vec()))
}

pub(super) fn decode_text(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Text(String::from_utf8(bytes.to_vec())?))
}

pub(super) fn decode_numeric(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Numeric(String::from_utf8(bytes.to_vec())?))
}
