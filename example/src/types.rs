use pglink::{Connection, Interval, Result, Value, types::Json};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, PrimitiveDateTime, macros::datetime};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Tag {
    name: String,
    weight: u32,
}

pub fn main() -> Result<()> {
    let conn = Connection::connect_env()?;

    let mut rows = conn.query(
        "SELECT $1::timestamp, $2::timestamptz, $3::interval, $4::int8[], $5::json",
        &[
            datetime!(2024-02-29 13:45:10.25).into(),
            datetime!(2024-05-01 09:30 +7).into(),
            Interval::new(1, 2, 3_000_000).into(),
            Value::array([Value::array([1, 2]), Value::array([3, 4])]),
            Json(Tag { name: "rust".into(), weight: 3 }).to_value()?,
        ],
    )?;
    let row = rows.next_row()?.unwrap();

    assert_eq!(row.try_get::<_, PrimitiveDateTime>(0)?, datetime!(2024-02-29 13:45:10.25));
    assert_eq!(row.try_get::<_, OffsetDateTime>(1)?, datetime!(2024-05-01 02:30 UTC));
    assert_eq!(row.try_get::<_, Interval>(2)?, Interval::new(1, 2, 3_000_000));
    assert_eq!(
        row.try_get::<_, Value>(3)?,
        Value::array([Value::array([1i64, 2]), Value::array([3i64, 4])]),
    );
    let Json(tag) = row.try_get::<_, Json<Tag>>(4)?;
    assert_eq!(tag.weight, 3);

    let mut rows = conn.query("SELECT 'infinity'::timestamp, NULL::text", &[])?;
    let row = rows.next_row()?.unwrap();
    assert_eq!(row.try_get::<_, PrimitiveDateTime>(0)?, PrimitiveDateTime::MAX);
    assert_eq!(row.try_get::<_, Option<String>>(1)?, None);

    Ok(())
}
