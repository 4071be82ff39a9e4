//! Postgres connection.
use parking_lot::Mutex;
use std::{io, sync::Arc};

mod config;
mod error;
mod session;
mod startup;

pub use config::{Config, ParseError};
pub use error::InterfaceError;
pub use startup::md5_password;
pub(crate) use session::Session;

use crate::{
    Result,
    copy::CopyStream,
    notify::{Notification, Sink},
    postgres::{DatabaseError, Oid, PgFormat, TransactionStatus, backend::BackendKeyData},
    rows::Rows,
    sql::{Sql, SqlExt, translate},
    statement::{self, Graveyard, Names, PreparedStatement},
    types::{Decoder, Value},
};

/// A single postgres connection.
///
/// Every command holds an internal lock from its first message until the
/// server is ready again, so a connection can be shared between threads.
///
/// ```no_run
/// use pglink::{Config, Connection};
///
/// # fn app() -> pglink::Result<()> {
/// let conn = Connection::connect(&Config::parse("postgres://postgres@localhost/postgres")?)?;
///
/// conn.execute("CREATE TEMP TABLE book(id int, title text)", &[])?;
/// conn.execute("INSERT INTO book VALUES($1, $2)", &[1.into(), "Dune".into()])?;
///
/// for row in conn.query("SELECT id, title FROM book", &[])? {
///     let (id, title) = row?.decode::<(i32, String)>()?;
///     println!("{id}: {title}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    pub(crate) session: Mutex<Session>,
    pub(crate) sink: Arc<Sink>,
    pub(crate) graveyard: Arc<Graveyard>,
    pub(crate) names: Names,
}

impl Connection {
    /// Connect and authenticate.
    pub fn connect(config: &Config) -> Result<Self> {
        let sink = Arc::new(Sink::default());
        let graveyard = Arc::new(Graveyard::default());
        let session = startup::connect(config, sink.clone(), graveyard.clone())?;
        Ok(Self {
            session: Mutex::new(session),
            sink,
            graveyard,
            names: Names::default(),
        })
    }

    /// Connect using configuration from environment variables.
    ///
    /// See [`Config::from_env`].
    pub fn connect_env() -> Result<Self> {
        Self::connect(&Config::from_env())
    }

    /// Prepare a statement, with parameter types taken from `params`.
    ///
    /// Persistent statements are kept in the statement cache, keyed by their
    /// sql and parameter types. Use [`SqlExt::once`] to skip the cache.
    pub fn prepare<S: Sql>(&self, sql: S, params: &[Value]) -> Result<PreparedStatement<'_>> {
        let mut session = self.session.lock();
        session.ensure_open()?;
        let translated = translate(sql.sql(), session.param_style);
        let inner = statement::prepare(&mut session, &self.names, &translated, sql.persistent(), params)?;
        Ok(PreparedStatement::new(self, inner))
    }

    /// Prepare and execute, returning the rows.
    pub fn query<S: Sql>(&self, sql: S, params: &[Value]) -> Result<Rows<'_>> {
        self.prepare(sql, params)?.execute(params)
    }

    /// Prepare and execute, returning the affected row count.
    pub fn execute<S: Sql>(&self, sql: S, params: &[Value]) -> Result<Option<u64>> {
        self.query(sql, params)?.finish()
    }

    /// Run `COPY ... FROM STDIN` with data read from `source`.
    pub fn copy_in(&self, sql: &str, source: &mut dyn io::Read) -> Result<Option<u64>> {
        self.prepare(sql.once(), &[])?
            .execute_with(&[], Some(CopyStream::In(source)))?
            .finish()
    }

    /// Run `COPY ... TO STDOUT` with data written to `sink`.
    pub fn copy_out(&self, sql: &str, sink: &mut dyn io::Write) -> Result<Option<u64>> {
        self.prepare(sql.once(), &[])?
            .execute_with(&[], Some(CopyStream::Out(sink)))?
            .finish()
    }

    pub fn begin(&self) -> Result<()> {
        self.execute("BEGIN TRANSACTION", &[]).map(drop)
    }

    pub fn commit(&self) -> Result<()> {
        self.execute("COMMIT TRANSACTION", &[]).map(drop)
    }

    pub fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK TRANSACTION", &[]).map(drop)
    }

    /// Returns `true` inside a transaction block, failed or not.
    pub fn in_transaction(&self) -> bool {
        self.transaction_status() != TransactionStatus::Idle
    }

    /// Status reported by the last `ReadyForQuery`.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.session.lock().status
    }

    /// Cancellation key of the backend process.
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.session.lock().backend_key
    }

    /// Run-time parameter as last reported by the server.
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.session.lock().parameters.get(name).cloned()
    }

    /// Take every notification received so far.
    ///
    /// Notifications arrive during commands, run any command to poll.
    pub fn notifications(&self) -> Vec<Notification> {
        self.sink.drain()
    }

    /// Register a callback for server notices.
    ///
    /// Handlers run on the thread executing the command while the connection
    /// is locked. Calling a command method of the same connection from a
    /// handler deadlocks; registering another handler is fine.
    pub fn on_notice(&self, handler: impl Fn(&DatabaseError) + Send + Sync + 'static) {
        self.sink.on_notice(Arc::new(handler));
    }

    /// Register a decoder for columns of `oid`.
    ///
    /// Applies to statements prepared afterwards.
    pub fn register_decoder(&self, oid: Oid, format: PgFormat, decoder: Decoder) {
        let mut session = self.session.lock();
        Arc::make_mut(&mut session.registry).register_decoder(oid, format, decoder);
    }

    /// Send `Terminate` and close the socket.
    ///
    /// Every operation afterwards fails with [`InterfaceError::Closed`], and
    /// so does a second `close` with [`InterfaceError::AlreadyClosed`].
    pub fn close(&self) -> Result<()> {
        self.session.lock().close()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.session.get_mut().close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session", &*self.session.lock())
            .field("sink", &self.sink)
            .finish()
    }
}
