//! Portal execution.
//!
//! ```text
//! Bind -> Execute(limit) -> Sync
//!     -> BindComplete -> (DataRow)* -> CommandComplete | EmptyQueryResponse | PortalSuspended
//!     -> ReadyForQuery
//!
//! while suspended and drained:
//! Execute(limit) -> Sync -> (DataRow)* -> CommandComplete | PortalSuspended -> ReadyForQuery
//! ```
use std::{collections::VecDeque, fmt, sync::Arc};

use crate::{
    Connection, Result,
    copy::{CopyChannel, CopyStream},
    postgres::{
        BackendMessage, ProtocolError,
        backend::DataRow,
        frontend::{Bind, Execute},
    },
    row::{Column, Row},
    statement::{Closing, PortalName, StatementInner},
    transport::PgStream,
    types::Value,
};

/// Lifecycle of the portal behind [`Rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalState {
    /// Not bound yet.
    Unexecuted,
    /// `Execute` sent, waiting for its completion.
    Open,
    /// Row limit reached, more rows available on the server.
    Suspended,
    /// Every row received.
    Exhausted,
}

/// Rows of an executed portal.
///
/// Rows are buffered as received and decoded on [`next_row`][Rows::next_row].
/// A suspended portal is resumed once the buffer is drained.
pub struct Rows<'c> {
    conn: &'c Connection,
    statement: Arc<StatementInner>,
    portal: PortalName,
    fetch: Fetch,
}

struct Fetch {
    cache: VecDeque<DataRow>,
    state: PortalState,
    fetched: u64,
    rows_affected: Option<u64>,
    has_columns: bool,
}

impl Fetch {
    fn handle(&mut self, copy: &mut CopyChannel, stream: &mut PgStream, message: BackendMessage) -> Result<()> {
        match message {
            BackendMessage::DataRow(row) => {
                self.fetched += 1;
                self.cache.push_back(row);
            }
            BackendMessage::CommandComplete(complete) => {
                self.state = PortalState::Exhausted;
                // the tag of a resumed portal only counts its last batch
                self.rows_affected = match complete.rows() {
                    Some(_) if self.has_columns => Some(self.fetched),
                    rows => rows,
                };
            }
            BackendMessage::PortalSuspended(_) => self.state = PortalState::Suspended,
            BackendMessage::EmptyQueryResponse(_) => self.state = PortalState::Exhausted,
            BackendMessage::CopyInResponse(_) => copy.copy_in(stream)?,
            BackendMessage::CopyOutResponse(_) => copy.copy_out()?,
            BackendMessage::CopyData(data) => copy.data(&data.data)?,
            BackendMessage::CopyDone(_) => copy.done()?,
            message => {
                return Err(ProtocolError::unexpected_phase(message.msgtype(), "execute").into());
            }
        }
        Ok(())
    }
}

impl<'c> Rows<'c> {
    pub(crate) fn execute(
        conn: &'c Connection,
        statement: Arc<StatementInner>,
        params: &[Value],
        copy: Option<CopyStream<'_>>,
    ) -> Result<Rows<'c>> {
        let mut session = conn.session.lock();
        session.ensure_open()?;
        statement.ensure_open()?;

        let (param_formats, params) = statement.bind(params)?;
        let result_formats = statement.result_formats();
        let max_row = session.row_limit();

        let mut rows = Rows {
            conn,
            portal: conn.names.portal(),
            fetch: Fetch {
                cache: VecDeque::new(),
                state: PortalState::Open,
                fetched: 0,
                rows_affected: None,
                has_columns: !statement.columns.is_empty(),
            },
            statement,
        };

        let portal_name = rows.portal.as_str();
        let stmt_name = rows.statement.name().as_str();
        let fetch = &mut rows.fetch;
        let mut copy = CopyChannel::new(copy);

        session.cycle(
            |stream| {
                stream.send(Bind {
                    portal_name,
                    stmt_name,
                    param_formats: &param_formats,
                    params: &params,
                    result_formats: &result_formats,
                });
                stream.send(Execute { portal_name, max_row });
            },
            |stream, message| fetch.handle(&mut copy, stream, message),
        )?;

        drop(session);
        Ok(rows)
    }

    fn resume(&mut self) -> Result<()> {
        let mut session = self.conn.session.lock();
        let max_row = session.row_limit();
        let portal_name = self.portal.as_str();
        let fetch = &mut self.fetch;
        let mut copy = CopyChannel::new(None);

        fetch.state = PortalState::Open;
        session.cycle(
            |stream| stream.send(Execute { portal_name, max_row }),
            |stream, message| fetch.handle(&mut copy, stream, message),
        )
    }

    /// Returns the next row, resuming the portal when needed.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.fetch.cache.pop_front() {
                return Row::from_data_row(&self.statement.columns, &self.statement.registry, row).map(Some);
            }
            match self.fetch.state {
                PortalState::Suspended => self.resume()?,
                _ => return Ok(None),
            }
        }
    }

    /// Discard remaining rows and returns the affected row count.
    pub fn finish(mut self) -> Result<Option<u64>> {
        loop {
            self.fetch.cache.clear();
            match self.fetch.state {
                PortalState::Suspended => self.resume()?,
                _ => return Ok(self.fetch.rows_affected),
            }
        }
    }

    /// Rows affected, known once the portal is exhausted.
    ///
    /// For statements returning rows, this is the number of rows received.
    /// Returns [`None`] for commands whose tag carries no count.
    pub fn rows_affected(&self) -> Option<u64> {
        self.fetch.rows_affected
    }

    pub fn columns(&self) -> &[Column] {
        &self.statement.columns
    }

    pub fn state(&self) -> PortalState {
        self.fetch.state
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl Drop for Rows<'_> {
    fn drop(&mut self) {
        if self.fetch.state != PortalState::Unexecuted {
            self.conn.graveyard.bury(Closing::Portal(self.portal.clone()));
        }
    }
}

impl fmt::Debug for Rows<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("portal", &self.portal)
            .field("state", &self.fetch.state)
            .field("buffered", &self.fetch.cache.len())
            .field("rows_affected", &self.fetch.rows_affected)
            .finish()
    }
}
