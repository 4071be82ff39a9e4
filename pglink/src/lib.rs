//! Blocking Postgres Driver
//!
//! Speaks the frontend/backend protocol version 3 over TCP, unix sockets or
//! TLS, using the extended query protocol with binary values where possible.
//!
//! # Examples
//!
//! ```no_run
//! use pglink::{Connection, Value};
//!
//! # fn app() -> pglink::Result<()> {
//! let conn = Connection::connect_env()?;
//!
//! let mut rows = conn.query("SELECT 420, $1", &["Foo".into()])?;
//! let row = rows.next_row()?.expect("one row");
//!
//! assert_eq!(row.try_get::<_, i32>(0)?, 420);
//! assert_eq!(row.try_get::<_, String>(1)?, "Foo");
//! # Ok(())
//! # }
//! ```
//!
//! Transactions and large results:
//!
//! ```no_run
//! use pglink::{Config, Connection};
//!
//! # fn app() -> pglink::Result<()> {
//! let conn = Connection::connect(&Config::from_env().row_cache_size(500))?;
//!
//! conn.begin()?;
//! let stmt = conn.prepare("SELECT g FROM generate_series(1, $1) g", &[10_000.into()])?;
//! let mut sum = 0i64;
//! for row in stmt.execute(&[10_000.into()])? {
//!     sum += row?.try_get::<_, i64>(0)?;
//! }
//! conn.commit()?;
//! # Ok(())
//! # }
//! ```
//!
//! Inside a transaction block a portal is fetched [`row_cache_size`][Config::row_cache_size]
//! rows at a time. Outside of one every row is received by the first `Execute`.
//!
//! # Features
//!
//! - `tls`, SSL connections with `native-tls`
//! - `json`, `json` and `jsonb` as `serde_json::Value` and `types::Json`
//! - `log`, notices and session teardown through the `log` crate
//! - `verbose`, trace every message with `tracing`

mod common;
mod ext;
mod net;
mod transport;

// Protocol
pub mod postgres;

// Encoding
pub mod types;

// Component
pub mod sql;
pub mod row;
mod statement;
mod rows;
mod copy;
mod notify;

// Connection
pub mod connection;

mod error;

pub use connection::{Config, Connection, InterfaceError, ParseError, md5_password};
pub use copy::CopyStream;
pub use error::{Error, ErrorKind, NotSupported, Result};
pub use notify::{NoticeHandler, Notification};
pub use postgres::{DatabaseError, Severity, TransactionStatus};
pub use row::{Column, FromRow, Row};
pub use rows::{PortalState, Rows};
pub use sql::{ParamStyle, SqlExt};
pub use statement::{PortalName, PreparedStatement, StatementName};
pub use types::{DecodeError, EncodeError, FromValue, Interval, PgDate, TypeRegistry, Value, ValueKind};
