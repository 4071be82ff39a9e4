use bytes::BytesMut;
use std::{collections::HashMap, fmt};

use super::{DecodeError, EncodeError, Value, ValueKind, array, scalar, temporal};
use crate::{
    Result,
    error::NotSupported,
    postgres::{Oid, PgFormat, oid},
};

/// Write the wire representation of a value.
pub type Encoder = fn(&TypeRegistry, &Value, &mut BytesMut) -> Result<(), EncodeError>;

/// Read a non-null column value.
pub type Decoder = fn(&TypeRegistry, &[u8]) -> Result<Value, DecodeError>;

/// Resolve container values whose oid depends on their content.
pub type Inspector = fn(&TypeRegistry, &Value) -> Result<OutEntry>;

/// How a parameter value is sent.
#[derive(Debug, Clone, Copy)]
pub struct OutEntry {
    /// [`None`] leaves the type for the server to infer.
    pub oid: Option<Oid>,
    pub format: PgFormat,
    pub encoder: Encoder,
}

impl OutEntry {
    /// Oid written in the `Parse` message.
    pub fn wire_oid(&self) -> Oid {
        self.oid.unwrap_or(oid::UNKNOWN)
    }
}

/// How a column value is received.
#[derive(Debug, Clone, Copy)]
pub struct InEntry {
    pub format: PgFormat,
    pub decoder: Decoder,
}

const TEXT_FALLBACK: InEntry = InEntry { format: PgFormat::Text, decoder: scalar::decode_text };

/// Bidirectional codec tables.
///
/// Outbound, a value kind maps to its oid, format and encoder, with arrays
/// going through an inspector. Inbound, a column oid maps to the format the
/// driver requests it in and the decoder for it. Unknown oids are requested
/// as text.
///
/// ```
/// use pglink::{TypeRegistry, Value, postgres::oid};
///
/// let registry = TypeRegistry::new();
/// let entry = registry.resolve(&Value::Int8(1)).unwrap();
/// assert_eq!(entry.oid, Some(oid::INT8));
///
/// let entry = registry.resolve(&Value::array([1i16, 2])).unwrap();
/// assert_eq!(entry.oid, Some(oid::INT2_ARRAY));
/// ```
#[derive(Clone)]
pub struct TypeRegistry {
    outbound: HashMap<ValueKind, OutEntry>,
    inspectors: HashMap<ValueKind, Inspector>,
    inbound: HashMap<Oid, InEntry>,
    integer_datetimes: bool,
}

impl TypeRegistry {
    /// Create registry with builtin codecs, assuming `integer_datetimes` is on.
    pub fn new() -> Self {
        let mut me = Self {
            outbound: HashMap::new(),
            inspectors: HashMap::new(),
            inbound: HashMap::new(),
            integer_datetimes: true,
        };

        macro_rules! outbound {
            ($($kind:ident => $oid:expr, $format:ident, $encoder:path;)*) => {$(
                me.outbound.insert(ValueKind::$kind, OutEntry {
                    oid: $oid,
                    format: PgFormat::$format,
                    encoder: $encoder,
                });
            )*};
        }

        macro_rules! inbound {
            ($format:ident, $decoder:path, [$($oid:ident),*]) => {$(
                me.inbound.insert(oid::$oid, InEntry {
                    format: PgFormat::$format,
                    decoder: $decoder,
                });
            )*};
        }

        outbound! {
            Null => None, Binary, scalar::encode_null;
            Bool => Some(oid::BOOL), Binary, scalar::encode_bool;
            Int2 => Some(oid::INT2), Binary, scalar::encode_int2;
            Int4 => Some(oid::INT4), Binary, scalar::encode_int4;
            Int8 => Some(oid::INT8), Binary, scalar::encode_int8;
            Float4 => Some(oid::FLOAT4), Binary, scalar::encode_float4;
            Float8 => Some(oid::FLOAT8), Binary, scalar::encode_float8;
            Numeric => Some(oid::NUMERIC), Text, scalar::encode_text;
            Text => Some(oid::UNKNOWN), Text, scalar::encode_text;
            Bytea => Some(oid::BYTEA), Binary, scalar::encode_bytea;
            Date => Some(oid::DATE), Binary, temporal::encode_date;
        }

        #[cfg(feature = "json")]
        outbound! {
            Json => Some(oid::JSON), Text, super::json::encode_json;
        }

        me.inspectors.insert(ValueKind::Array, array::inspect);

        inbound!(Binary, scalar::decode_bool, [BOOL]);
        inbound!(Binary, scalar::decode_bytea, [BYTEA]);
        inbound!(Binary, scalar::decode_int2, [INT2]);
        inbound!(Binary, scalar::decode_int4, [INT4]);
        inbound!(Binary, scalar::decode_int8, [INT8]);
        inbound!(Binary, scalar::decode_oid, [OID]);
        inbound!(Binary, scalar::decode_float4, [FLOAT4]);
        inbound!(Binary, scalar::decode_float8, [FLOAT8]);
        inbound!(Binary, temporal::decode_date, [DATE]);
        inbound!(Text, scalar::decode_text, [TEXT, CHAR, NAME, BPCHAR, VARCHAR, UNKNOWN, XML, UUID]);
        inbound!(Text, scalar::decode_numeric, [NUMERIC]);
        inbound!(Binary, array::decode_array, [
            BOOL_ARRAY, BYTEA_ARRAY, CHAR_ARRAY, NAME_ARRAY, INT2_ARRAY, INT4_ARRAY,
            TEXT_ARRAY, BPCHAR_ARRAY, VARCHAR_ARRAY, INT8_ARRAY, FLOAT4_ARRAY,
            FLOAT8_ARRAY, OID_ARRAY, DATE_ARRAY, TIME_ARRAY, TIMESTAMP_ARRAY,
            TIMESTAMPTZ_ARRAY, INTERVAL_ARRAY, JSON_ARRAY
        ]);

        #[cfg(feature = "json")]
        inbound!(Text, super::json::decode_json, [JSON, JSONB]);
        #[cfg(not(feature = "json"))]
        inbound!(Text, scalar::decode_text, [JSON, JSONB]);

        me.install_temporal(true);
        me
    }

    /// Resolve how `value` is sent.
    ///
    /// Fails with not supported error when the value kind has neither a table
    /// entry nor an inspector, or when the inspector rejects the content.
    pub fn resolve(&self, value: &Value) -> Result<OutEntry> {
        let kind = value.kind();
        if let Some(entry) = self.outbound.get(&kind) {
            return Ok(*entry);
        }
        match self.inspectors.get(&kind) {
            Some(inspect) => inspect(self, value),
            None => Err(NotSupported::new(format!("sending `{kind}` values")).into()),
        }
    }

    /// Resolve how a column of `oid` is received, unknown oid fallback to text.
    pub fn resolve_oid(&self, oid: Oid) -> InEntry {
        self.inbound.get(&oid).copied().unwrap_or(TEXT_FALLBACK)
    }

    /// Outbound entry for a value kind, without inspection.
    pub fn outbound(&self, kind: ValueKind) -> Option<OutEntry> {
        self.outbound.get(&kind).copied()
    }

    /// Inbound entry for an oid, without fallback.
    pub fn inbound(&self, oid: Oid) -> Option<InEntry> {
        self.inbound.get(&oid).copied()
    }

    /// Resolve and encode `value` into `buf`.
    pub fn encode(&self, value: &Value, buf: &mut BytesMut) -> Result<OutEntry> {
        let entry = self.resolve(value)?;
        (entry.encoder)(self, value, buf)?;
        Ok(entry)
    }

    /// Decode a non-null value of `oid`.
    pub fn decode(&self, oid: Oid, bytes: &[u8]) -> Result<Value, DecodeError> {
        (self.resolve_oid(oid).decoder)(self, bytes)
    }

    /// Whether the server stores datetimes as integer microseconds.
    pub fn integer_datetimes(&self) -> bool {
        self.integer_datetimes
    }

    /// Swap the `time`, `timestamp`, `timestamptz` and `interval` codecs
    /// between their integer and floating point representation.
    pub fn set_integer_datetimes(&mut self, integer: bool) {
        self.install_temporal(integer);
    }

    /// Override the encoder of a value kind.
    pub fn register_encoder(&mut self, kind: ValueKind, entry: OutEntry) {
        self.outbound.insert(kind, entry);
    }

    /// Register a decoder for columns of `oid`, requested in `format`.
    ///
    /// Errors from the decoder should be wrapped in [`DecodeError::Custom`],
    /// they are returned to the caller unchanged.
    pub fn register_decoder(&mut self, oid: Oid, format: PgFormat, decoder: Decoder) {
        self.inbound.insert(oid, InEntry { format, decoder });
    }

    fn install_temporal(&mut self, integer: bool) {
        self.integer_datetimes = integer;
        self.outbound.extend(temporal::outbound(integer));
        self.inbound.extend(temporal::inbound(integer));
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("outbound", &self.outbound.len())
            .field("inbound", &self.inbound.len())
            .field("integer_datetimes", &self.integer_datetimes)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Interval;
    use time::macros::datetime;

    fn roundtrip(registry: &TypeRegistry, value: Value) -> Value {
        let mut buf = BytesMut::new();
        let entry = registry.encode(&value, &mut buf).unwrap();
        registry.decode(entry.oid.unwrap(), &buf).unwrap()
    }

    #[test]
    fn integer_boundaries() {
        let registry = TypeRegistry::new();
        for value in [
            Value::Int2(i16::MIN),
            Value::Int2(i16::MAX),
            Value::Int4(i32::MIN),
            Value::Int4(i32::MAX),
            Value::Int8(i64::MIN),
            Value::Int8(i64::MAX),
        ] {
            assert_eq!(roundtrip(&registry, value.clone()), value);
        }
    }

    #[test]
    fn scalars() {
        let registry = TypeRegistry::new();
        for value in [
            Value::Bool(true),
            Value::Bool(false),
            Value::Float4(1.5),
            Value::Float8(-0.25),
            Value::Bytea(vec![0, 1, 255]),
        ] {
            assert_eq!(roundtrip(&registry, value.clone()), value);
        }
    }

    #[test]
    fn text_is_sent_untyped() {
        let registry = TypeRegistry::new();
        let entry = registry.resolve(&Value::Text("x".into())).unwrap();
        assert_eq!(entry.oid, Some(oid::UNKNOWN));
        assert_eq!(entry.format, PgFormat::Text);

        let entry = registry.resolve(&Value::Null).unwrap();
        assert_eq!(entry.oid, None);
        assert_eq!(entry.wire_oid(), oid::UNKNOWN);
    }

    #[test]
    fn numeric_is_text() {
        let registry = TypeRegistry::new();
        let mut buf = BytesMut::new();
        let entry = registry.encode(&Value::Numeric("12.50".into()), &mut buf).unwrap();
        assert_eq!(entry.oid, Some(oid::NUMERIC));
        assert_eq!(entry.format, PgFormat::Text);
        assert_eq!(&buf[..], b"12.50");
        assert_eq!(registry.decode(oid::NUMERIC, b"12.50").unwrap(), Value::Numeric("12.50".into()));
    }

    #[test]
    fn unknown_oid_falls_back_to_text() {
        let registry = TypeRegistry::new();
        let entry = registry.resolve_oid(600);
        assert_eq!(entry.format, PgFormat::Text);
        assert_eq!(registry.decode(600, b"(1,2)").unwrap(), Value::Text("(1,2)".into()));
    }

    #[test]
    fn float_datetimes_swap() {
        let mut registry = TypeRegistry::new();
        let value = Value::Timestamp(datetime!(2024-02-29 13:45:10.25));

        let mut integer = BytesMut::new();
        registry.encode(&value, &mut integer).unwrap();

        registry.set_integer_datetimes(false);
        assert!(!registry.integer_datetimes());

        let mut float = BytesMut::new();
        registry.encode(&value, &mut float).unwrap();
        assert_ne!(integer, float);
        assert_eq!(registry.decode(oid::TIMESTAMP, &float).unwrap(), value);

        let interval = Value::Interval(Interval::new(1, 2, 3_500_000));
        assert_eq!(roundtrip(&registry, interval.clone()), interval);

        registry.set_integer_datetimes(true);
        assert_eq!(registry.decode(oid::TIMESTAMP, &integer).unwrap(), value);
    }

    #[test]
    fn custom_decoder_error_passthrough() {
        #[derive(Debug)]
        struct Nope;
        impl fmt::Display for Nope {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("nope")
            }
        }
        impl std::error::Error for Nope { }

        let mut registry = TypeRegistry::new();
        registry.register_decoder(600, PgFormat::Text, |_, _| Err(DecodeError::custom(Nope)));
        let err = registry.decode(600, b"(1,2)").unwrap_err();
        assert!(matches!(&err, DecodeError::Custom(e) if e.is::<Nope>()));
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn int_out_of_range() {
        let registry = TypeRegistry::new();
        let entry = registry.resolve(&Value::Int2(0)).unwrap();
        let mut buf = BytesMut::new();
        let err = (entry.encoder)(&registry, &Value::Int8(1 << 20), &mut buf).unwrap_err();
        assert!(matches!(err, EncodeError::OutOfRange { target: "int2", .. }));
    }

    #[test]
    fn mismatched_encoder() {
        let registry = TypeRegistry::new();
        let entry = registry.resolve(&Value::Bool(true)).unwrap();
        let mut buf = BytesMut::new();
        let err = (entry.encoder)(&registry, &Value::Text("t".into()), &mut buf).unwrap_err();
        assert!(matches!(err, EncodeError::Mismatch { found: ValueKind::Text, .. }));
    }
}
