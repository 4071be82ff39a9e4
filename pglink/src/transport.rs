//! The [`PgStream`] transport.
use bytes::BytesMut;
use std::io::{self, BufReader, Write};

use crate::{
    Result,
    common::verbose,
    ext::FmtExt,
    net::Socket,
    postgres::{BackendMessage, BackendProtocol, FrontendProtocol, codec, frontend},
};

const DEFAULT_BUF_CAPACITY: usize = 8 * 1024;

/// A buffered stream which can send and receive postgres message.
///
/// Sends are buffered until [`flush`][PgStream::flush].
#[derive(Debug)]
pub struct PgStream {
    socket: BufReader<Socket>,
    write_buf: BytesMut,
}

impl PgStream {
    pub fn new(socket: Socket) -> Self {
        Self {
            socket: BufReader::with_capacity(DEFAULT_BUF_CAPACITY, socket),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
        }
    }

    /// Buffer a frontend message.
    pub fn send<F: FrontendProtocol>(&mut self, message: F) {
        verbose!(msgtype = %(F::MSGTYPE as char), "send");
        frontend::write(message, &mut self.write_buf);
    }

    /// Buffer the [`Startup`][frontend::Startup] message.
    ///
    /// For historical reasons, the very first message sent by the client
    /// has no initial message-type byte.
    pub fn send_startup(&mut self, startup: frontend::Startup) {
        verbose!(user = startup.user, database = startup.database, "send startup");
        startup.write(&mut self.write_buf);
    }

    /// Write all buffered messages to the socket.
    pub fn flush(&mut self) -> io::Result<()> {
        let socket = self.socket.get_mut();
        socket.write_all(&self.write_buf)?;
        self.write_buf.clear();
        socket.flush()
    }

    /// Block until one backend message is received.
    pub fn recv(&mut self) -> Result<BackendMessage> {
        let (msgtype, body) = codec::read_message(&mut self.socket)?;
        verbose!(
            msgtype = BackendMessage::message_name(msgtype),
            body = %body.lossy(),
            "recv"
        );
        Ok(BackendMessage::decode(msgtype, body)?)
    }

    /// Best effort socket shutdown.
    pub fn shutdown(&mut self) {
        let _ = self.socket.get_mut().shutdown();
    }
}
