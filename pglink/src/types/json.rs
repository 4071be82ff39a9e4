use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::{DecodeError, EncodeError, FromValue, TypeRegistry, Value, scalar::mismatch};

/// Typed json value.
///
/// Converted into [`Value::Json`] by serializing, and extracted from `json`
/// and `jsonb` columns by deserializing.
///
/// ```
/// use pglink::{FromValue, Value, types::Json};
///
/// let value = Json(vec![1, 2]).to_value().unwrap();
/// let Json(back) = Json::<Vec<i32>>::from_value(&value).unwrap();
/// assert_eq!(back, [1, 2]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: Serialize> Json<T> {
    /// Serialize into [`Value::Json`].
    pub fn to_value(&self) -> Result<Value, EncodeError> {
        serde_json::to_value(&self.0).map(Value::Json).map_err(EncodeError::Json)
    }
}

impl<T: DeserializeOwned> FromValue for Json<T> {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Json(json) => Ok(Json(T::deserialize(json)?)),
            Value::Text(text) => Ok(Json(serde_json::from_str(text)?)),
            Value::Null => Err(DecodeError::Null),
            other => Err(DecodeError::Mismatch { expected: "json", found: other.kind() }),
        }
    }
}

impl<T: Serialize> Serialize for Json<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Json<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(T::deserialize(deserializer)?))
    }
}

pub(super) fn encode_json(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    match value {
        Value::Json(json) => serde_json::to_writer(buf.writer(), json).map_err(EncodeError::Json),
        other => Err(mismatch("json", other)),
    }
}

/// `json` and `jsonb` are both requested in text format.
pub(super) fn decode_json(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Json(serde_json::from_slice(bytes)?))
}
