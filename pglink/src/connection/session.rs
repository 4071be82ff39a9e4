//! Command cycle.
use lru::LruCache;
use std::{collections::HashMap, sync::Arc};

use super::{Config, InterfaceError};
use crate::{
    Error, Result,
    common::{log_debug, span, verbose},
    notify::Sink,
    postgres::{
        BackendMessage, TransactionStatus,
        backend::{BackendKeyData, ParameterStatus},
        frontend,
    },
    sql::ParamStyle,
    statement::{Graveyard, StatementInner, StatementKey},
    transport::PgStream,
    types::TypeRegistry,
};

/// State of one backend session.
///
/// Lives behind the connection mutex, one command cycle holds the lock from
/// the first byte written until `ReadyForQuery`.
pub(crate) struct Session {
    stream: Option<PgStream>,
    terminated: bool,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) statements: LruCache<StatementKey, Arc<StatementInner>>,
    pub(crate) status: TransactionStatus,
    pub(crate) backend_key: Option<BackendKeyData>,
    pub(crate) parameters: HashMap<String, String>,
    pub(crate) sink: Arc<Sink>,
    pub(crate) graveyard: Arc<Graveyard>,
    pub(crate) row_cache_size: u32,
    pub(crate) param_style: ParamStyle,
}

impl Session {
    pub(crate) fn new(config: &Config, sink: Arc<Sink>, graveyard: Arc<Graveyard>) -> Self {
        Self {
            stream: None,
            terminated: false,
            registry: Arc::new(TypeRegistry::new()),
            statements: LruCache::new(config.statement_cache_size),
            status: TransactionStatus::Idle,
            backend_key: None,
            parameters: HashMap::new(),
            sink,
            graveyard,
            row_cache_size: config.row_cache_size,
            param_style: config.param_style,
        }
    }

    /// Attach the stream after a successful handshake.
    pub(crate) fn attach(&mut self, stream: PgStream) {
        self.stream = Some(stream);
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.stream {
            Some(_) => Ok(()),
            None => Err(InterfaceError::Closed.into()),
        }
    }

    /// `Execute` row limit, unlimited outside a transaction block.
    ///
    /// The `Sync` ending each cycle commits an implicit transaction and
    /// closes its portals, so suspension only works inside a block.
    pub(crate) fn row_limit(&self) -> u32 {
        match self.status {
            TransactionStatus::Idle => 0,
            TransactionStatus::Transaction | TransactionStatus::Failed => self.row_cache_size,
        }
    }

    /// Run one command cycle.
    ///
    /// Pending `Close` messages are written first, then `write`, then `Sync`.
    /// Messages not handled by the session are passed to `handler`.
    pub(crate) fn cycle<W, H>(&mut self, write: W, handler: H) -> Result<()>
    where
        W: FnOnce(&mut PgStream),
        H: FnMut(&mut PgStream, BackendMessage) -> Result<()>,
    {
        span!("cycle");
        let Some(mut stream) = self.stream.take() else {
            return Err(InterfaceError::Closed.into());
        };

        for closing in self.graveyard.take() {
            verbose!(?closing, "close");
            closing.send(&mut stream);
        }
        write(&mut stream);
        stream.send(frontend::Sync);

        let outcome = match stream.flush() {
            Ok(()) => self.run_until_ready_for_query(&mut stream, handler),
            Err(err) => Err(err.into()),
        };

        match outcome {
            Ok(result) => {
                self.stream = Some(stream);
                result
            }
            Err(err) => {
                log_debug!("session closed: {err}");
                stream.shutdown();
                self.statements.clear();
                self.graveyard.take();
                Err(err)
            }
        }
    }

    /// Read messages until `ReadyForQuery`.
    ///
    /// The outer error means the wire is broken and the stream must be
    /// dropped. The inner result is the outcome of the cycle, the first error
    /// captured is returned only after the cycle is drained.
    pub(crate) fn run_until_ready_for_query<H>(
        &mut self,
        stream: &mut PgStream,
        mut handler: H,
    ) -> Result<Result<()>>
    where
        H: FnMut(&mut PgStream, BackendMessage) -> Result<()>,
    {
        let mut captured: Option<Error> = None;

        loop {
            let message = match stream.recv() {
                Ok(ok) => ok,
                // a server going down usually says why before closing
                Err(err) => return Err(captured.unwrap_or(err)),
            };

            match message {
                BackendMessage::ReadyForQuery(ready) => {
                    self.status = ready.status;
                    break;
                }
                BackendMessage::ErrorResponse(err) => {
                    captured.get_or_insert(err.0.into());
                }
                BackendMessage::NoticeResponse(notice) => self.sink.notice(&notice.0),
                BackendMessage::NotificationResponse(notification) => {
                    self.sink.notify(notification.into())
                }
                BackendMessage::ParameterStatus(status) => self.parameter_status(status),
                BackendMessage::BackendKeyData(key) => self.backend_key = Some(key),
                BackendMessage::ParseComplete(_)
                | BackendMessage::BindComplete(_)
                | BackendMessage::CloseComplete(_) => {}
                message => {
                    if let Err(err) = handler(stream, message) {
                        if err.is_fatal() {
                            return Err(err);
                        }
                        captured.get_or_insert(err);
                    }
                }
            }
        }

        Ok(match captured {
            Some(err) => Err(err),
            None => Ok(()),
        })
    }

    fn parameter_status(&mut self, status: ParameterStatus) {
        if status.name == "integer_datetimes" {
            let integer = status.value == "on";
            if self.registry.integer_datetimes() != integer {
                Arc::make_mut(&mut self.registry).set_integer_datetimes(integer);
            }
        }
        self.parameters.insert(status.name, status.value);
    }

    /// Send `Terminate` and drop the socket.
    pub(crate) fn close(&mut self) -> Result<()> {
        if self.terminated {
            return Err(InterfaceError::AlreadyClosed.into());
        }
        self.terminated = true;
        self.statements.clear();
        self.graveyard.take();

        if let Some(mut stream) = self.stream.take() {
            log_debug!("session terminated");
            stream.send(frontend::Terminate);
            let _ = stream.flush();
            stream.shutdown();
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.stream.is_some())
            .field("status", &self.status)
            .field("backend_key", &self.backend_key)
            .field("statements", &self.statements.len())
            .finish()
    }
}
