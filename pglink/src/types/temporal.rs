//! Date and time codecs.
//!
//! Postgres counts from `2000-01-01 00:00:00`. Servers built with
//! `integer_datetimes` send microseconds as `int8`, older ones send seconds
//! as `float8`. Both layouts are here, [`outbound`] and [`inbound`] pick one.
use bytes::{Buf, BufMut, BytesMut};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time};

use super::{
    DecodeError, EncodeError, InEntry, Interval, OutEntry, PgDate, TypeRegistry, Value, ValueKind,
    scalar::{fixed, mismatch},
};
use crate::postgres::{Oid, PgFormat, oid};

const PG_EPOCH_JULIAN: i32 = 2_451_545;

const PG_EPOCH: PrimitiveDateTime = {
    // source: `from_julian_day` docs
    let date = match Date::from_julian_day(PG_EPOCH_JULIAN) {
        Ok(ok) => ok,
        Err(_) => panic!("julian day of 2000-01-01 is in range"),
    };
    PrimitiveDateTime::new(date, Time::MIDNIGHT)
};

const PG_EPOCH_UTC: OffsetDateTime = PG_EPOCH.assume_utc();

const USECS_PER_SEC: f64 = 1_000_000.0;
const USECS_PER_DAY: i64 = 86_400_000_000;

pub(super) fn encode_date(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let Value::Date(date) = value else {
        return Err(mismatch("date", value));
    };
    let days = match *date {
        PgDate::Value(date) => date.to_julian_day() - PG_EPOCH_JULIAN,
        PgDate::PositiveInfinity => i32::MAX,
        PgDate::NegativeInfinity => i32::MIN,
    };
    buf.put_i32(days);
    Ok(())
}

pub(super) fn decode_date(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    let date = match i32::from_be_bytes(fixed("date", bytes)?) {
        i32::MAX => PgDate::PositiveInfinity,
        i32::MIN => PgDate::NegativeInfinity,
        days => days
            .checked_add(PG_EPOCH_JULIAN)
            .and_then(|julian| Date::from_julian_day(julian).ok())
            .map(PgDate::Value)
            .ok_or(DecodeError::OutOfRange("date"))?,
    };
    Ok(Value::Date(date))
}

/// Entries that depend on the server datetime representation.
pub(super) fn outbound(integer: bool) -> [(ValueKind, OutEntry); 4] {
    macro_rules! entry {
        ($oid:ident, $int:path, $float:path) => {
            OutEntry {
                oid: Some(oid::$oid),
                format: PgFormat::Binary,
                encoder: if integer { $int } else { $float },
            }
        };
    }
    [
        (ValueKind::Time, entry!(TIME, encode_time_int, encode_time_float)),
        (ValueKind::Timestamp, entry!(TIMESTAMP, encode_timestamp_int, encode_timestamp_float)),
        (ValueKind::TimestampTz, entry!(TIMESTAMPTZ, encode_timestamptz_int, encode_timestamptz_float)),
        (ValueKind::Interval, entry!(INTERVAL, encode_interval_int, encode_interval_float)),
    ]
}

/// Decoders that depend on the server datetime representation.
pub(super) fn inbound(integer: bool) -> [(Oid, InEntry); 4] {
    macro_rules! entry {
        ($oid:ident, $int:path, $float:path) => {
            (oid::$oid, InEntry {
                format: PgFormat::Binary,
                decoder: if integer { $int } else { $float },
            })
        };
    }
    [
        entry!(TIME, decode_time_int, decode_time_float),
        entry!(TIMESTAMP, decode_timestamp_int, decode_timestamp_float),
        entry!(TIMESTAMPTZ, decode_timestamptz_int, decode_timestamptz_float),
        entry!(INTERVAL, decode_interval_int, decode_interval_float),
    ]
}

// ===== time =====

fn time_micros(time: Time) -> i64 {
    let (h, m, s, us) = time.as_hms_micro();
    ((i64::from(h) * 60 + i64::from(m)) * 60 + i64::from(s)) * 1_000_000 + i64::from(us)
}

fn time_from_micros(micros: i64) -> Result<Time, DecodeError> {
    if !(0..USECS_PER_DAY).contains(&micros) {
        return Err(DecodeError::OutOfRange("time"));
    }
    let secs = micros / 1_000_000;
    Time::from_hms_micro(
        (secs / 3600) as u8,
        (secs / 60 % 60) as u8,
        (secs % 60) as u8,
        (micros % 1_000_000) as u32,
    )
    .map_err(|_| DecodeError::OutOfRange("time"))
}

fn encode_time_int(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let Value::Time(time) = value else {
        return Err(mismatch("time", value));
    };
    buf.put_i64(time_micros(*time));
    Ok(())
}

fn encode_time_float(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let Value::Time(time) = value else {
        return Err(mismatch("time", value));
    };
    buf.put_f64(time_micros(*time) as f64 / USECS_PER_SEC);
    Ok(())
}

fn decode_time_int(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    let micros = i64::from_be_bytes(fixed("time", bytes)?);
    time_from_micros(micros).map(Value::Time)
}

fn decode_time_float(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    let secs = f64::from_be_bytes(fixed("time", bytes)?);
    time_from_micros(secs_to_micros(secs, "time")?).map(Value::Time)
}

// ===== timestamp =====

fn secs_to_micros(secs: f64, ty: &'static str) -> Result<i64, DecodeError> {
    if secs.is_nan() {
        return Err(DecodeError::Malformed(ty));
    }
    let micros = (secs * USECS_PER_SEC).round();
    if micros < i64::MIN as f64 || micros >= i64::MAX as f64 {
        return Err(DecodeError::OutOfRange(ty));
    }
    Ok(micros as i64)
}

/// Microseconds since the postgres epoch, infinities excluded.
fn timestamp_micros(kind: ValueKind, since_epoch: Duration) -> Result<i64, EncodeError> {
    i64::try_from(since_epoch.whole_microseconds())
        .map_err(|_| EncodeError::OutOfRange { kind, target: "timestamp" })
}

fn timestamp_from_micros(micros: i64) -> Result<PrimitiveDateTime, DecodeError> {
    PG_EPOCH
        .checked_add(Duration::microseconds(micros))
        .ok_or(DecodeError::OutOfRange("timestamp"))
}

enum Stamp {
    Finite(i64),
    Infinity,
    NegInfinity,
}

fn timestamp_stamp(value: &Value) -> Result<Stamp, EncodeError> {
    match value {
        Value::Timestamp(ts) if *ts == PrimitiveDateTime::MAX => Ok(Stamp::Infinity),
        Value::Timestamp(ts) if *ts == PrimitiveDateTime::MIN => Ok(Stamp::NegInfinity),
        Value::Timestamp(ts) => timestamp_micros(value.kind(), *ts - PG_EPOCH).map(Stamp::Finite),
        other => Err(mismatch("timestamp", other)),
    }
}

fn timestamptz_stamp(value: &Value) -> Result<Stamp, EncodeError> {
    match value {
        Value::TimestampTz(ts) if *ts == PrimitiveDateTime::MAX.assume_utc() => Ok(Stamp::Infinity),
        Value::TimestampTz(ts) if *ts == PrimitiveDateTime::MIN.assume_utc() => Ok(Stamp::NegInfinity),
        Value::TimestampTz(ts) => timestamp_micros(value.kind(), *ts - PG_EPOCH_UTC).map(Stamp::Finite),
        other => Err(mismatch("timestamptz", other)),
    }
}

fn put_timestamp_int(stamp: Stamp, buf: &mut BytesMut) {
    buf.put_i64(match stamp {
        Stamp::Finite(micros) => micros,
        Stamp::Infinity => i64::MAX,
        Stamp::NegInfinity => i64::MIN,
    });
}

fn put_timestamp_float(stamp: Stamp, buf: &mut BytesMut) {
    buf.put_f64(match stamp {
        Stamp::Finite(micros) => micros as f64 / USECS_PER_SEC,
        Stamp::Infinity => f64::INFINITY,
        Stamp::NegInfinity => f64::NEG_INFINITY,
    });
}

fn get_timestamp_int(bytes: &[u8]) -> Result<PrimitiveDateTime, DecodeError> {
    match i64::from_be_bytes(fixed("timestamp", bytes)?) {
        i64::MAX => Ok(PrimitiveDateTime::MAX),
        i64::MIN => Ok(PrimitiveDateTime::MIN),
        micros => timestamp_from_micros(micros),
    }
}

fn get_timestamp_float(bytes: &[u8]) -> Result<PrimitiveDateTime, DecodeError> {
    let secs = f64::from_be_bytes(fixed("timestamp", bytes)?);
    if secs == f64::INFINITY {
        Ok(PrimitiveDateTime::MAX)
    } else if secs == f64::NEG_INFINITY {
        Ok(PrimitiveDateTime::MIN)
    } else {
        timestamp_from_micros(secs_to_micros(secs, "timestamp")?)
    }
}

fn encode_timestamp_int(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    put_timestamp_int(timestamp_stamp(value)?, buf);
    Ok(())
}

fn encode_timestamp_float(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    put_timestamp_float(timestamp_stamp(value)?, buf);
    Ok(())
}

fn encode_timestamptz_int(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    put_timestamp_int(timestamptz_stamp(value)?, buf);
    Ok(())
}

fn encode_timestamptz_float(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    put_timestamp_float(timestamptz_stamp(value)?, buf);
    Ok(())
}

fn decode_timestamp_int(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    get_timestamp_int(bytes).map(Value::Timestamp)
}

fn decode_timestamp_float(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    get_timestamp_float(bytes).map(Value::Timestamp)
}

fn decode_timestamptz_int(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    get_timestamp_int(bytes).map(|ts| Value::TimestampTz(ts.assume_utc()))
}

fn decode_timestamptz_float(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    get_timestamp_float(bytes).map(|ts| Value::TimestampTz(ts.assume_utc()))
}

// ===== interval =====

fn encode_interval_int(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let Value::Interval(interval) = value else {
        return Err(mismatch("interval", value));
    };
    buf.put_i64(interval.microseconds);
    buf.put_i32(interval.days);
    buf.put_i32(interval.months);
    Ok(())
}

fn encode_interval_float(_: &TypeRegistry, value: &Value, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let Value::Interval(interval) = value else {
        return Err(mismatch("interval", value));
    };
    buf.put_f64(interval.microseconds as f64 / USECS_PER_SEC);
    buf.put_i32(interval.days);
    buf.put_i32(interval.months);
    Ok(())
}

fn decode_interval_int(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    let mut bytes = &fixed::<16>("interval", bytes)?[..];
    let microseconds = bytes.get_i64();
    let days = bytes.get_i32();
    let months = bytes.get_i32();
    Ok(Value::Interval(Interval { months, days, microseconds }))
}

fn decode_interval_float(_: &TypeRegistry, bytes: &[u8]) -> Result<Value, DecodeError> {
    let mut bytes = &fixed::<16>("interval", bytes)?[..];
    let microseconds = secs_to_micros(bytes.get_f64(), "interval")?;
    let days = bytes.get_i32();
    let months = bytes.get_i32();
    Ok(Value::Interval(Interval { months, days, microseconds }))
}

#[cfg(test)]
mod test {
    use super::*;
    use time::{
        UtcOffset,
        macros::{date, datetime, time},
    };

    fn encode(registry: &TypeRegistry, value: &Value) -> BytesMut {
        let mut buf = BytesMut::new();
        registry.encode(value, &mut buf).unwrap();
        buf
    }

    #[test]
    fn epoch_is_zero() {
        let registry = TypeRegistry::new();
        assert_eq!(&encode(&registry, &date!(2000-01-01).into())[..], &[0; 4]);
        assert_eq!(&encode(&registry, &Value::Timestamp(datetime!(2000-01-01 0:00)))[..], &[0; 8]);
        assert_eq!(
            &encode(&registry, &date!(1999-12-31).into())[..],
            &(-1i32).to_be_bytes(),
        );
    }

    #[test]
    fn infinity() {
        let registry = TypeRegistry::new();
        let buf = encode(&registry, &Value::Timestamp(PrimitiveDateTime::MAX));
        assert_eq!(&buf[..], &i64::MAX.to_be_bytes());
        assert_eq!(
            registry.decode(oid::TIMESTAMP, &i64::MIN.to_be_bytes()).unwrap(),
            Value::Timestamp(PrimitiveDateTime::MIN),
        );
        assert_eq!(
            registry.decode(oid::DATE, &i32::MAX.to_be_bytes()).unwrap(),
            Value::Date(PgDate::PositiveInfinity),
        );
        let buf = encode(&registry, &Value::Date(PgDate::NegativeInfinity));
        assert_eq!(&buf[..], &i32::MIN.to_be_bytes());

        let mut registry = registry;
        registry.set_integer_datetimes(false);
        let buf = encode(&registry, &Value::Timestamp(PrimitiveDateTime::MIN));
        assert_eq!(&buf[..], &f64::NEG_INFINITY.to_be_bytes());
    }

    #[test]
    fn last_representable_dates_are_finite() {
        let registry = TypeRegistry::new();

        let buf = encode(&registry, &Date::MAX.into());
        assert_eq!(&buf[..], &2_921_939i32.to_be_bytes());
        assert_eq!(registry.decode(oid::DATE, &buf).unwrap(), Value::from(date!(9999-12-31)));

        let last = Value::Timestamp(datetime!(9999-12-31 23:59:59.999_999));
        let buf = encode(&registry, &last);
        assert_ne!(&buf[..], &i64::MAX.to_be_bytes());
        assert_eq!(registry.decode(oid::TIMESTAMP, &buf).unwrap(), last);
    }

    #[test]
    fn timestamptz_normalized_to_utc() {
        let registry = TypeRegistry::new();
        let local = datetime!(2024-05-01 09:30 +7);
        let utc = local.to_offset(UtcOffset::UTC);
        assert_eq!(
            encode(&registry, &Value::TimestampTz(local)),
            encode(&registry, &Value::Timestamp(datetime!(2024-05-01 02:30))),
        );
        let buf = encode(&registry, &Value::TimestampTz(local));
        assert_eq!(registry.decode(oid::TIMESTAMPTZ, &buf).unwrap(), Value::TimestampTz(utc));
    }

    #[test]
    fn time_of_day() {
        for registry in [TypeRegistry::new(), {
            let mut r = TypeRegistry::new();
            r.set_integer_datetimes(false);
            r
        }] {
            let value = Value::Time(time!(23:59:59.999_999));
            let buf = encode(&registry, &value);
            assert_eq!(registry.decode(oid::TIME, &buf).unwrap(), value);
        }

        let registry = TypeRegistry::new();
        let err = registry.decode(oid::TIME, &USECS_PER_DAY.to_be_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRange("time")));
    }

    #[test]
    fn interval_layout() {
        let registry = TypeRegistry::new();
        let buf = encode(&registry, &Value::Interval(Interval::new(14, 3, 4_000_000)));
        let mut expected = Vec::new();
        expected.extend_from_slice(&4_000_000i64.to_be_bytes());
        expected.extend_from_slice(&3i32.to_be_bytes());
        expected.extend_from_slice(&14i32.to_be_bytes());
        assert_eq!(&buf[..], &expected[..]);
    }
}
