//! Postgres row operation.
//!
//! - [`Row`]
//! - [`Column`]
//! - [`FromRow`]
//! - [`Index`]
use bytes::{Buf, Bytes};
use std::{fmt, sync::Arc};

use crate::{
    Result,
    ext::BytesExt,
    postgres::{Oid, PgFormat, ProtocolError, backend::{DataRow, FieldDescription}},
    types::{DecodeError, Decoder, FromValue, TypeRegistry, Value},
};

/// Result column description, with the decoder chosen when the statement
/// was described.
#[derive(Clone)]
pub struct Column {
    name: String,
    table_oid: Oid,
    attribute: i16,
    type_oid: Oid,
    type_size: i16,
    type_modifier: i32,
    format: PgFormat,
    decoder: Decoder,
}

impl Column {
    pub(crate) fn new(field: FieldDescription, registry: &TypeRegistry) -> Self {
        let entry = registry.resolve_oid(field.type_oid);
        Self {
            name: field.name,
            table_oid: field.table_oid,
            attribute: field.attribute,
            type_oid: field.type_oid,
            type_size: field.type_size,
            type_modifier: field.type_modifier,
            format: entry.format,
            decoder: entry.decoder,
        }
    }

    /// Returns column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Oid of the source table, zero for computed columns.
    pub fn table_oid(&self) -> Oid {
        self.table_oid
    }

    /// Attribute number in the source table, zero for computed columns.
    pub fn attribute(&self) -> i16 {
        self.attribute
    }

    /// Returns column type [`Oid`].
    pub fn type_oid(&self) -> Oid {
        self.type_oid
    }

    /// `pg_type.typlen`, negative for variable width types.
    pub fn type_size(&self) -> i16 {
        self.type_size
    }

    /// `pg_attribute.atttypmod`
    pub fn type_modifier(&self) -> i32 {
        self.type_modifier
    }

    /// Format the column is requested in.
    pub fn format(&self) -> PgFormat {
        self.format
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("type_oid", &self.type_oid)
            .field("format", &self.format)
            .finish()
    }
}

/// Postgres row.
#[derive(Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl Row {
    /// Decode a `DataRow` message.
    pub(crate) fn from_data_row(columns: &Arc<[Column]>, registry: &TypeRegistry, row: DataRow) -> Result<Row> {
        if usize::from(row.column_len) != columns.len() {
            return Err(ProtocolError::malformed("DataRow").into());
        }

        let mut body = row.body;
        let mut values = Vec::with_capacity(columns.len());

        for column in columns.iter() {
            body.ensure(4, "DataRow")?;
            let value = match body.get_i32() {
                -1 => Value::Null,
                len => {
                    let len = usize::try_from(len).map_err(|_| ProtocolError::malformed("DataRow"))?;
                    body.ensure(len, "DataRow")?;
                    let bytes: Bytes = body.split_to(len);
                    (column.decoder)(registry, &bytes)?
                }
            };
            values.push(value);
        }

        Ok(Self { columns: columns.clone(), values })
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the value at `idx`, if the column exists.
    pub fn get<I: Index>(&self, idx: I) -> Option<&Value> {
        idx.position(&self.columns).ok().map(|i| &self.values[i])
    }

    /// Try get and convert column.
    pub fn try_get<I: Index, T: FromValue>(&self, idx: I) -> Result<T, DecodeError> {
        let i = idx.position(&self.columns)?;
        T::from_value(&self.values[i])
    }

    /// Try convert using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(&self) -> Result<D, DecodeError> {
        D::from_row(self)
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (column, value) in self.columns.iter().zip(&self.values) {
            dbg.entry(&column.name, value);
        }
        dbg.finish()
    }
}

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, DecodeError>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(row.clone())
    }
}

impl FromRow for () {
    fn from_row(_: &Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:literal),*) => {
        impl<$($t),*> FromRow for ($($t),*,)
        where
            $($t: FromValue),*
        {
            fn from_row(row: &Row) -> Result<Self, DecodeError> {
                Ok((
                    $(row.try_get($i)?),*,
                ))
            }
        }
    };
}

from_row_tuple!(T0 0);
from_row_tuple!(T0 0, T1 1);
from_row_tuple!(T0 0, T1 1, T2 2);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3);

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns the column position.
    fn position(self, columns: &[Column]) -> Result<usize, DecodeError>;
}

impl Index for usize {
    fn position(self, columns: &[Column]) -> Result<usize, DecodeError> {
        match self < columns.len() {
            true => Ok(self),
            false => Err(DecodeError::IndexOutOfBounds(self)),
        }
    }
}

impl Index for &str {
    fn position(self, columns: &[Column]) -> Result<usize, DecodeError> {
        columns
            .iter()
            .position(|e| e.name == self)
            .ok_or_else(|| DecodeError::ColumnNotFound(String::from(self).into()))
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::postgres::oid;

    fn columns(registry: &TypeRegistry) -> Arc<[Column]> {
        let field = |name: &str, type_oid| FieldDescription {
            name: name.into(),
            table_oid: 0,
            attribute: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format: 0,
        };
        [field("id", oid::INT4), field("name", oid::TEXT)]
            .into_iter()
            .map(|e| Column::new(e, registry))
            .collect()
    }

    #[test]
    fn decode_row() {
        let registry = TypeRegistry::new();
        let columns = columns(&registry);
        let row = DataRow {
            column_len: 2,
            body: Bytes::from_static(b"\0\0\0\x04\0\0\0\x2a\xff\xff\xff\xff"),
        };
        let row = Row::from_data_row(&columns, &registry, row).unwrap();

        assert_eq!(row.len(), 2);
        assert_eq!(row.try_get::<_, i32>("id").unwrap(), 42);
        assert_eq!(row.try_get::<_, Option<String>>(1).unwrap(), None);
        assert_eq!(row.get("name"), Some(&Value::Null));
        assert!(matches!(row.try_get::<_, String>("name"), Err(DecodeError::Null)));
        assert!(matches!(row.try_get::<_, i32>("nope"), Err(DecodeError::ColumnNotFound(_))));
        assert!(matches!(row.try_get::<_, i32>(2), Err(DecodeError::IndexOutOfBounds(2))));

        let (id, name) = row.decode::<(i64, Option<String>)>().unwrap();
        assert_eq!((id, name), (42, None));
    }

    #[test]
    fn text_format_for_unknown_oid() {
        let registry = TypeRegistry::new();
        let field = FieldDescription {
            name: "x".into(),
            table_oid: 0,
            attribute: 0,
            type_oid: 600,
            type_size: 16,
            type_modifier: -1,
            format: 0,
        };
        let column = Column::new(field, &registry);
        assert_eq!(column.format(), PgFormat::Text);
    }

    #[test]
    fn truncated_row() {
        let registry = TypeRegistry::new();
        let columns = columns(&registry);
        let row = DataRow { column_len: 2, body: Bytes::from_static(b"\0\0\0\x04\0\0") };
        assert!(Row::from_data_row(&columns, &registry, row).is_err());

        let row = DataRow { column_len: 1, body: Bytes::new() };
        assert!(Row::from_data_row(&columns, &registry, row).is_err());
    }
}
