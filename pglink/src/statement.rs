//! Prepared statements and their server side names.
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use crate::{
    Connection, Result,
    connection::{InterfaceError, Session},
    copy::CopyStream,
    postgres::{
        BackendMessage, Oid, PgFormat, ProtocolError,
        backend::FieldDescription,
        frontend::{Close, Describe, Parse},
        oid,
    },
    row::Column,
    rows::Rows,
    transport::PgStream,
    types::{EncodeError, OutEntry, TypeRegistry, Value},
};

const ID_LEN: usize = 11;

/// Server side object name, a prefix byte followed by a zero padded counter.
#[derive(Clone, PartialEq, Eq)]
pub struct Id([u8; ID_LEN]);

impl Id {
    fn next(prefix: u8, atomic: &AtomicU32) -> Self {
        let id = atomic.fetch_add(1, Ordering::Relaxed);
        let mut buf = [b'0'; ID_LEN];
        buf[0] = prefix;

        let mut b = itoa::Buffer::new();
        let id = b.format(id).as_bytes();
        buf[ID_LEN - id.len()..].copy_from_slice(id);

        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: only ever constructed from ascii
        unsafe { std::str::from_utf8_unchecked(&self.0[..]) }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Id").field(&self.as_str()).finish()
    }
}

macro_rules! delegate {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(Id);

        impl $name {
            pub(crate) fn next(atomic: &AtomicU32) -> Self {
                Self(Id::next($prefix, atomic))
            }
        }

        impl std::ops::Deref for $name {
            type Target = Id;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.as_str()).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

delegate!(StatementName, b's');
delegate!(PortalName, b'p');

/// Per connection name counters.
#[derive(Debug, Default)]
pub(crate) struct Names {
    statement: AtomicU32,
    portal: AtomicU32,
}

impl Names {
    pub(crate) fn statement(&self) -> StatementName {
        StatementName::next(&self.statement)
    }

    pub(crate) fn portal(&self) -> PortalName {
        PortalName::next(&self.portal)
    }
}

/// Server object waiting for its `Close` message.
#[derive(Debug)]
pub(crate) enum Closing {
    Statement(StatementName),
    Portal(PortalName),
}

impl Closing {
    pub(crate) fn send(&self, stream: &mut PgStream) {
        let (variant, name) = match self {
            Closing::Statement(name) => (b'S', name.as_str()),
            Closing::Portal(name) => (b'P', name.as_str()),
        };
        stream.send(Close { variant, name });
    }
}

/// Objects dropped outside of a command cycle.
///
/// Their `Close` is written in front of the next cycle.
#[derive(Debug, Default)]
pub(crate) struct Graveyard(Mutex<Vec<Closing>>);

impl Graveyard {
    pub(crate) fn bury(&self, closing: Closing) {
        self.0.lock().push(closing);
    }

    pub(crate) fn take(&self) -> Vec<Closing> {
        std::mem::take(&mut *self.0.lock())
    }
}

/// Statement cache key, parameter oids and the translated sql.
pub(crate) type StatementKey = (Vec<Option<Oid>>, String);

pub(crate) struct StatementInner {
    name: StatementName,
    sql: String,
    params: Vec<OutEntry>,
    param_oids: Vec<Oid>,
    pub(crate) columns: Arc<[Column]>,
    pub(crate) registry: Arc<TypeRegistry>,
    closed: AtomicBool,
    graveyard: Arc<Graveyard>,
}

impl StatementInner {
    pub(crate) fn name(&self) -> &StatementName {
        &self.name
    }

    fn key(&self) -> StatementKey {
        (self.params.iter().map(|e| e.oid).collect(), self.sql.clone())
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.closed.load(Ordering::Acquire) {
            true => Err(InterfaceError::StatementClosed.into()),
            false => Ok(()),
        }
    }

    pub(crate) fn result_formats(&self) -> Vec<PgFormat> {
        self.columns.iter().map(Column::format).collect()
    }

    /// Encode `values` for `Bind`.
    ///
    /// A value is sent with its own encoder when it resolves to the oid the
    /// parameter was prepared with, or when it is untyped text. Otherwise the
    /// encoder the statement was prepared with is tried, which lets integers
    /// and floats widen or narrow into the prepared type.
    pub(crate) fn bind(&self, values: &[Value]) -> Result<(Vec<PgFormat>, Vec<Option<Bytes>>)> {
        if values.len() != self.params.len() {
            return Err(InterfaceError::ParameterCount {
                expected: self.params.len(),
                found: values.len(),
            }.into());
        }

        let mut formats = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len());
        let mut buf = BytesMut::new();

        for (index, (value, prepared)) in values.iter().zip(&self.params).enumerate() {
            if value.is_null() {
                formats.push(prepared.format);
                params.push(None);
                continue;
            }

            let target = match prepared.oid {
                Some(prepared_oid) if prepared_oid != oid::UNKNOWN => prepared_oid,
                _ => self.param_oids.get(index).copied().unwrap_or(oid::UNKNOWN),
            };
            let entry = self.registry.resolve(value)?;

            if entry.oid == Some(target) || entry.oid == Some(oid::UNKNOWN) {
                (entry.encoder)(&self.registry, value, &mut buf)?;
                formats.push(entry.format);
            } else if prepared.oid == Some(target) && !matches!(value, Value::Array(_)) {
                match (prepared.encoder)(&self.registry, value, &mut buf) {
                    Ok(()) => {}
                    Err(EncodeError::Mismatch { found, .. }) => {
                        return Err(InterfaceError::ParameterType { index, expected: target, found }.into());
                    }
                    Err(err) => return Err(err.into()),
                }
                formats.push(prepared.format);
            } else {
                return Err(InterfaceError::ParameterType {
                    index,
                    expected: target,
                    found: value.kind(),
                }.into());
            }

            params.push(Some(buf.split().freeze()));
        }

        Ok((formats, params))
    }
}

impl Drop for StatementInner {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            self.graveyard.bury(Closing::Statement(self.name.clone()));
        }
    }
}

impl fmt::Debug for StatementInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("name", &self.name)
            .field("sql", &self.sql)
            .field("params", &self.param_oids)
            .field("columns", &self.columns)
            .finish()
    }
}

/// Parse and describe `sql`, or return the cached statement.
///
/// ```text
/// Parse -> Describe(S) -> Sync
///     -> ParseComplete -> ParameterDescription -> RowDescription | NoData
///     -> ReadyForQuery
/// ```
pub(crate) fn prepare(
    session: &mut Session,
    names: &Names,
    sql: &str,
    persistent: bool,
    values: &[Value],
) -> Result<Arc<StatementInner>> {
    let params = values
        .iter()
        .map(|e| session.registry.resolve(e))
        .collect::<Result<Vec<_>>>()?;
    let key: StatementKey = (params.iter().map(|e| e.oid).collect(), sql.to_owned());

    if persistent {
        if let Some(statement) = session.statements.get(&key) {
            return Ok(statement.clone());
        }
    }

    let name = names.statement();
    let oids = params.iter().map(OutEntry::wire_oid).collect::<Vec<_>>();
    let mut param_oids = Vec::new();
    let mut fields: Vec<FieldDescription> = Vec::new();

    session.cycle(
        |stream| {
            stream.send(Parse { prepare_name: name.as_str(), sql, oids: &oids });
            stream.send(Describe { kind: b'S', name: name.as_str() });
        },
        |_, message| {
            match message {
                BackendMessage::ParameterDescription(desc) => param_oids = desc.oids,
                BackendMessage::RowDescription(desc) => fields = desc.fields,
                BackendMessage::NoData(_) => {}
                message => return Err(ProtocolError::unexpected_phase(message.msgtype(), "prepare").into()),
            }
            Ok(())
        },
    )?;

    let registry = session.registry.clone();
    let columns = fields.into_iter().map(|e| Column::new(e, &registry)).collect();
    let statement = Arc::new(StatementInner {
        name,
        sql: key.1.clone(),
        params,
        param_oids,
        columns,
        registry,
        closed: AtomicBool::new(false),
        graveyard: session.graveyard.clone(),
    });

    if persistent {
        session.statements.push(key, statement.clone());
    }

    Ok(statement)
}

/// A statement parsed by the server, ready to be executed repeatedly.
///
/// Dropping the last handle of a statement not held by the statement cache
/// closes it on the server with the next command.
pub struct PreparedStatement<'c> {
    conn: &'c Connection,
    inner: Arc<StatementInner>,
}

impl<'c> PreparedStatement<'c> {
    pub(crate) fn new(conn: &'c Connection, inner: Arc<StatementInner>) -> Self {
        Self { conn, inner }
    }

    /// Bind `params` to a new portal and execute it.
    pub fn execute(&self, params: &[Value]) -> Result<Rows<'c>> {
        self.execute_with(params, None)
    }

    /// Same as [`execute`][PreparedStatement::execute], with the stream
    /// used if the statement is a `COPY`.
    pub fn execute_with(&self, params: &[Value], copy: Option<CopyStream<'_>>) -> Result<Rows<'c>> {
        Rows::execute(self.conn, self.inner.clone(), params, copy)
    }

    /// Execute once per parameter set, returning the summed row count.
    ///
    /// Returns [`None`] when no execution reported a row count.
    pub fn execute_many(&self, params: &[Vec<Value>]) -> Result<Option<u64>> {
        let mut total = None;
        for params in params {
            if let Some(rows) = self.execute(params)?.finish()? {
                *total.get_or_insert(0) += rows;
            }
        }
        Ok(total)
    }

    /// Close the statement on the server.
    ///
    /// Other handles to the same statement fail with
    /// [`InterfaceError::StatementClosed`] afterwards.
    pub fn close(self) -> Result<()> {
        let mut session = self.conn.session.lock();
        session.ensure_open()?;
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(InterfaceError::StatementClosed.into());
        }

        let key = self.inner.key();
        if session.statements.peek(&key).is_some_and(|e| Arc::ptr_eq(e, &self.inner)) {
            session.statements.pop(&key);
        }

        let name = self.inner.name.as_str();
        session.cycle(
            |stream| stream.send(Close { variant: b'S', name }),
            |_, message| Err(ProtocolError::unexpected_phase(message.msgtype(), "close").into()),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.inner.columns
    }

    /// Parameter oids as inferred by the server.
    pub fn params(&self) -> &[Oid] {
        &self.inner.param_oids
    }

    /// The sql sent to the server, after placeholder translation.
    pub fn sql(&self) -> &str {
        &self.inner.sql
    }

    pub fn name(&self) -> &StatementName {
        &self.inner.name
    }
}

impl fmt::Debug for PreparedStatement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}
