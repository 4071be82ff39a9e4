//! Binary array codec.
//!
//! ```text
//! ndim: i32, has_null: i32, element oid: u32,
//! (length: i32, lower bound: i32) * ndim,
//! (length: i32, bytes) * product(length), length -1 is NULL
//! ```
use bytes::{Buf, BufMut, BytesMut};

use super::{DecodeError, EncodeError, OutEntry, TypeRegistry, Value, ValueKind, scalar::mismatch};
use crate::{
    error::NotSupported,
    postgres::{Oid, PgFormat, oid},
};

/// Validated layout of an array value.
#[derive(Debug)]
struct Shape {
    dims: Vec<usize>,
    /// Kind of the non-null leaves, integer widths merged into `Int8`.
    kind: ValueKind,
    has_null: bool,
    min: i64,
    max: i64,
}

impl Shape {
    fn of(items: &[Value]) -> Result<Shape, EncodeError> {
        let mut dims = vec![items.len()];
        let mut first = items.first();
        while let Some(Value::Array(inner)) = first {
            dims.push(inner.len());
            first = inner.first();
        }

        let mut shape = Shape {
            dims,
            kind: ValueKind::Null,
            has_null: false,
            min: i64::MAX,
            max: i64::MIN,
        };
        let mut leaves = Vec::new();
        shape.collect(items, 0, &mut leaves)?;

        for leaf in leaves {
            let kind = match leaf {
                Value::Null => {
                    shape.has_null = true;
                    continue;
                }
                Value::Int2(_) | Value::Int4(_) | Value::Int8(_) => ValueKind::Int8,
                other => other.kind(),
            };
            if shape.kind == ValueKind::Null {
                shape.kind = kind;
            } else if shape.kind != kind {
                return Err(EncodeError::ArrayContentNotHomogeneous);
            }
            if let Some(int) = leaf.as_integer() {
                shape.min = shape.min.min(int);
                shape.max = shape.max.max(int);
            }
        }

        if shape.kind == ValueKind::Null {
            return Err(EncodeError::ArrayContentEmpty);
        }

        Ok(shape)
    }

    fn collect<'a>(
        &self,
        items: &'a [Value],
        depth: usize,
        leaves: &mut Vec<&'a Value>,
    ) -> Result<(), EncodeError> {
        if items.len() != self.dims[depth] {
            return Err(EncodeError::ArrayDimensionsNotConsistent);
        }
        let leaf_level = depth + 1 == self.dims.len();
        for item in items {
            match (item, leaf_level) {
                (Value::Array(inner), false) => self.collect(inner, depth + 1, leaves)?,
                (Value::Array(_), true) => return Err(EncodeError::ArrayDimensionsNotConsistent),
                (_, false) => return Err(EncodeError::ArrayDimensionsNotConsistent),
                (leaf, true) => leaves.push(leaf),
            }
        }
        Ok(())
    }

    /// Element kind, oid and array oid.
    fn element(&self) -> Option<(ValueKind, Oid, Oid)> {
        let fits = |lo: i64, hi: i64| lo <= self.min && self.max <= hi;
        let found = match self.kind {
            ValueKind::Int8 if fits(i16::MIN.into(), i16::MAX.into()) => {
                (ValueKind::Int2, oid::INT2, oid::INT2_ARRAY)
            }
            ValueKind::Int8 if fits(i32::MIN.into(), i32::MAX.into()) => {
                (ValueKind::Int4, oid::INT4, oid::INT4_ARRAY)
            }
            ValueKind::Int8 => (ValueKind::Int8, oid::INT8, oid::INT8_ARRAY),
            ValueKind::Bool => (ValueKind::Bool, oid::BOOL, oid::BOOL_ARRAY),
            ValueKind::Bytea => (ValueKind::Bytea, oid::BYTEA, oid::BYTEA_ARRAY),
            ValueKind::Text => (ValueKind::Text, oid::TEXT, oid::TEXT_ARRAY),
            ValueKind::Float4 => (ValueKind::Float4, oid::FLOAT4, oid::FLOAT4_ARRAY),
            ValueKind::Float8 => (ValueKind::Float8, oid::FLOAT8, oid::FLOAT8_ARRAY),
            ValueKind::Date => (ValueKind::Date, oid::DATE, oid::DATE_ARRAY),
            ValueKind::Time => (ValueKind::Time, oid::TIME, oid::TIME_ARRAY),
            ValueKind::Timestamp => (ValueKind::Timestamp, oid::TIMESTAMP, oid::TIMESTAMP_ARRAY),
            ValueKind::TimestampTz => (ValueKind::TimestampTz, oid::TIMESTAMPTZ, oid::TIMESTAMPTZ_ARRAY),
            ValueKind::Interval => (ValueKind::Interval, oid::INTERVAL, oid::INTERVAL_ARRAY),
            _ => return None,
        };
        Some(found)
    }
}

fn shape_of(value: &Value) -> Result<Shape, EncodeError> {
    match value {
        Value::Array(items) => Shape::of(items),
        other => Err(mismatch("array", other)),
    }
}

/// Array oid depends on the element kind, and for integers, on their range.
pub(super) fn inspect(_: &TypeRegistry, value: &Value) -> crate::Result<OutEntry> {
    let shape = shape_of(value)?;
    let Some((_, _, array_oid)) = shape.element() else {
        return Err(NotSupported::new(format!("`{}` array elements", shape.kind)).into());
    };
    Ok(OutEntry {
        oid: Some(array_oid),
        format: PgFormat::Binary,
        encoder: encode_array,
    })
}

fn encode_array(registry: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let shape = shape_of(value)?;
    let Some((kind, elem_oid, _)) = shape.element() else {
        return Err(mismatch("array element", value));
    };
    let Some(entry) = registry.outbound(kind) else {
        return Err(mismatch("array element", value));
    };

    buf.put_i32(shape.dims.len() as i32);
    buf.put_i32(shape.has_null as i32);
    buf.put_u32(elem_oid);
    for &len in &shape.dims {
        let len = i32::try_from(len)
            .map_err(|_| EncodeError::OutOfRange { kind: ValueKind::Array, target: "array" })?;
        buf.put_i32(len);
        buf.put_i32(1);
    }

    let mut leaves = Vec::new();
    if let Value::Array(items) = value {
        shape.collect(items, 0, &mut leaves)?;
    }

    for leaf in leaves {
        if leaf.is_null() {
            buf.put_i32(-1);
            continue;
        }
        let offset = buf.len();
        buf.put_i32(0);
        (entry.encoder)(registry, leaf, buf)?;
        let len = i32::try_from(buf.len() - offset - 4)
            .map_err(|_| EncodeError::OutOfRange { kind: leaf.kind(), target: "array element" })?;
        buf[offset..offset + 4].copy_from_slice(&len.to_be_bytes());
    }

    Ok(())
}

const MALFORMED: DecodeError = DecodeError::Malformed("array");

fn ensure(buf: &[u8], len: usize) -> Result<(), DecodeError> {
    if buf.len() < len { Err(MALFORMED) } else { Ok(()) }
}

pub(super) fn decode_array(registry: &TypeRegistry, mut buf: &[u8]) -> Result<Value, DecodeError> {
    ensure(buf, 12)?;
    let ndim = buf.get_i32();
    let _has_null = buf.get_i32();
    let elem_oid = buf.get_u32();

    let ndim = usize::try_from(ndim).map_err(|_| MALFORMED)?;
    if ndim == 0 {
        return Ok(Value::Array(vec![]));
    }

    let mut dims = Vec::new();
    let mut total = 1usize;
    for _ in 0..ndim {
        ensure(buf, 8)?;
        let len = usize::try_from(buf.get_i32()).map_err(|_| MALFORMED)?;
        let _lower_bound = buf.get_i32();
        total = total.checked_mul(len).ok_or(MALFORMED)?;
        dims.push(len);
    }

    // every element carries at least its length
    if total > buf.len() / 4 {
        return Err(MALFORMED);
    }

    let entry = registry.resolve_oid(elem_oid);
    let mut flat = Vec::with_capacity(total);
    for _ in 0..total {
        ensure(buf, 4)?;
        let len = buf.get_i32();
        if len == -1 {
            flat.push(Value::Null);
            continue;
        }
        let len = usize::try_from(len).map_err(|_| MALFORMED)?;
        ensure(buf, len)?;
        flat.push((entry.decoder)(registry, &buf[..len])?);
        buf.advance(len);
    }

    if !buf.is_empty() {
        return Err(MALFORMED);
    }

    Ok(fold(flat, &dims))
}

/// Group the flat element list, innermost dimension first.
fn fold(flat: Vec<Value>, dims: &[usize]) -> Value {
    let mut level = flat;
    for depth in (1..dims.len()).rev() {
        let groups: usize = dims[..depth].iter().product();
        let mut items = level.into_iter();
        level = (0..groups)
            .map(|_| Value::Array(items.by_ref().take(dims[depth]).collect()))
            .collect();
    }
    Value::Array(level)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ErrorKind;

    fn roundtrip(value: Value) -> (Oid, Value) {
        let registry = TypeRegistry::new();
        let mut buf = BytesMut::new();
        let entry = registry.encode(&value, &mut buf).unwrap();
        let oid = entry.oid.unwrap();
        (oid, registry.decode(oid, &buf).unwrap())
    }

    fn encode_err(value: Value) -> ErrorKind {
        TypeRegistry::new().resolve(&value).unwrap_err().into_kind()
    }

    #[test]
    fn one_dimension_with_null() {
        let value = Value::array([Some(1i16), None, Some(3)]);
        assert_eq!(roundtrip(value.clone()), (oid::INT2_ARRAY, value));
    }

    #[test]
    fn two_dimensions() {
        let value = Value::array([
            Value::array([Some("a"), None]),
            Value::array([Some("c"), Some("d")]),
        ]);
        assert_eq!(roundtrip(value.clone()), (oid::TEXT_ARRAY, value));
    }

    #[test]
    fn three_dimensions() {
        let value = Value::array([
            Value::array([Value::array([Some(true), Some(false)]), Value::array([None, Some(true)])]),
            Value::array([Value::array([Some(false), Some(false)]), Value::array([Some(true), None])]),
        ]);
        assert_eq!(roundtrip(value.clone()), (oid::BOOL_ARRAY, value));
    }

    #[test]
    fn wire_layout() {
        let registry = TypeRegistry::new();
        let mut buf = BytesMut::new();
        registry.encode(&Value::array([Some(7i16), None]), &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[
                0, 0, 0, 1, // ndim
                0, 0, 0, 1, // has null
                0, 0, 0, 21, // int2
                0, 0, 0, 2, 0, 0, 0, 1, // length, lower bound
                0, 0, 0, 2, 0, 7, // 7
                255, 255, 255, 255, // null
            ][..],
        );
    }

    #[test]
    fn integer_width_selection() {
        let registry = TypeRegistry::new();
        let oid_of = |items: Vec<Value>| registry.resolve(&Value::Array(items)).unwrap().oid.unwrap();

        assert_eq!(oid_of(vec![Value::Int8(1), Value::Int2(i16::MAX)]), oid::INT2_ARRAY);
        assert_eq!(oid_of(vec![Value::Int4(i16::MIN.into())]), oid::INT2_ARRAY);
        assert_eq!(oid_of(vec![Value::Int4(i32::from(i16::MAX) + 1)]), oid::INT4_ARRAY);
        assert_eq!(oid_of(vec![Value::Int4(i32::from(i16::MIN) - 1)]), oid::INT4_ARRAY);
        assert_eq!(oid_of(vec![Value::Int8(i32::MAX.into())]), oid::INT4_ARRAY);
        assert_eq!(oid_of(vec![Value::Int8(i64::from(i32::MAX) + 1)]), oid::INT8_ARRAY);
        assert_eq!(oid_of(vec![Value::Null, Value::Int8(i64::from(i32::MIN) - 1)]), oid::INT8_ARRAY);

        let (oid, value) = roundtrip(Value::array([1i64, i64::from(i32::MAX) + 1]));
        assert_eq!(oid, oid::INT8_ARRAY);
        assert_eq!(value, Value::array([1i64, i64::from(i32::MAX) + 1]));
    }

    #[test]
    fn inconsistent_dimensions() {
        let value = Value::array([Value::array([1, 2]), Value::array([3])]);
        assert!(matches!(encode_err(value), ErrorKind::Encode(EncodeError::ArrayDimensionsNotConsistent)));

        let value = Value::array([Value::array([1]), Value::Int4(2)]);
        assert!(matches!(encode_err(value), ErrorKind::Encode(EncodeError::ArrayDimensionsNotConsistent)));
    }

    #[test]
    fn empty_content() {
        let value = Value::Array(vec![]);
        assert!(matches!(encode_err(value), ErrorKind::Encode(EncodeError::ArrayContentEmpty)));

        let value = Value::Array(vec![Value::Null]);
        assert!(matches!(encode_err(value), ErrorKind::Encode(EncodeError::ArrayContentEmpty)));
    }

    #[test]
    fn mixed_kinds() {
        let value = Value::Array(vec![Value::Int4(1), Value::Text("a".into())]);
        assert!(matches!(encode_err(value), ErrorKind::Encode(EncodeError::ArrayContentNotHomogeneous)));
    }

    #[test]
    fn numeric_elements_not_supported() {
        let value = Value::Array(vec![Value::Numeric("1.5".into())]);
        assert!(matches!(encode_err(value), ErrorKind::NotSupported(_)));
    }

    #[test]
    fn zero_dimensions() {
        let registry = TypeRegistry::new();
        let bytes = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 23];
        assert_eq!(registry.decode(oid::INT4_ARRAY, &bytes).unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn truncated() {
        let registry = TypeRegistry::new();
        let bytes = [0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 23, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 4, 0, 0];
        assert!(matches!(registry.decode(oid::INT4_ARRAY, &bytes), Err(DecodeError::Malformed("array"))));
    }
}
