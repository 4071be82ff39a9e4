//! Connection establishment.
//!
//! ```text
//! [SSLRequest -> S | N] -> StartupMessage
//!     -> AuthenticationOk
//!      | AuthenticationMD5Password -> PasswordMessage -> AuthenticationOk
//!     -> (ParameterStatus | BackendKeyData)* -> ReadyForQuery
//! ```
use md5::{Digest, Md5};
use std::sync::Arc;

use super::{Config, InterfaceError, Session};
use crate::{
    Result,
    common::span,
    error::NotSupported,
    net::Socket,
    notify::Sink,
    postgres::{
        BackendMessage, ProtocolError,
        backend::Authentication,
        frontend::{PasswordMessage, Startup},
    },
    statement::Graveyard,
    transport::PgStream,
};

/// Open the socket, authenticate and wait for the first `ReadyForQuery`.
pub(crate) fn connect(config: &Config, sink: Arc<Sink>, graveyard: Arc<Graveyard>) -> Result<Session> {
    span!("connect", host = %config.host, port = config.port);

    let socket = open(config)?;
    let mut stream = PgStream::new(socket);
    let mut session = Session::new(config, sink, graveyard);

    match handshake(&mut session, &mut stream, config) {
        Ok(()) => {
            session.attach(stream);
            Ok(session)
        }
        Err(err) => {
            stream.shutdown();
            Err(err)
        }
    }
}

fn open(config: &Config) -> Result<Socket> {
    #[cfg(not(feature = "tls"))]
    if config.ssl {
        return Err(InterfaceError::TlsUnavailable.into());
    }

    #[cfg(unix)]
    if let Some(path) = config.socket_path() {
        return Ok(Socket::connect_unix(&path)?);
    }

    let socket = Socket::connect_tcp(&config.host, config.port, config.connect_timeout)?;

    #[cfg(feature = "tls")]
    if config.ssl {
        return negotiate_ssl(socket, &config.host);
    }

    Ok(socket)
}

#[cfg(feature = "tls")]
fn negotiate_ssl(mut socket: Socket, host: &str) -> Result<Socket> {
    use crate::postgres::frontend::SslRequest;
    use std::io::{Read, Write};

    let mut buf = bytes::BytesMut::with_capacity(8);
    SslRequest.write(&mut buf);
    socket.write_all(&buf)?;
    socket.flush()?;

    // single byte reply, not a framed message
    let mut reply = [0u8];
    socket.read_exact(&mut reply)?;
    match reply[0] {
        b'S' => socket.upgrade(host),
        b'N' => Err(InterfaceError::SslRefused.into()),
        other => Err(ProtocolError::unexpected_phase(other, "ssl negotiation").into()),
    }
}

fn handshake(session: &mut Session, stream: &mut PgStream, config: &Config) -> Result<()> {
    stream.send_startup(Startup {
        user: &config.user,
        database: config.dbname.as_deref(),
        application_name: config.application_name.as_deref(),
    });
    stream.flush()?;

    loop {
        match stream.recv()? {
            BackendMessage::Authentication(Authentication::Ok) => break,
            BackendMessage::Authentication(Authentication::MD5Password { salt }) => {
                let Some(password) = config.password.as_deref() else {
                    return Err(InterfaceError::PasswordRequired.into());
                };
                let password = md5_password(&config.user, password, salt);
                stream.send(PasswordMessage { password: &password });
                stream.flush()?;
            }
            BackendMessage::Authentication(other) => {
                let method = format!("{} authentication", other.method_name());
                return Err(NotSupported::new(method).into());
            }
            BackendMessage::ErrorResponse(err) => return Err(err.0.into()),
            BackendMessage::NoticeResponse(notice) => session.sink.notice(&notice.0),
            // server supports an older minor version, nothing this driver uses
            BackendMessage::NegotiateProtocolVersion(_) => {}
            other => {
                return Err(ProtocolError::unexpected_phase(other.msgtype(), "authentication").into());
            }
        }
    }

    session.run_until_ready_for_query(stream, |_, message| {
        Err(ProtocolError::unexpected_phase(message.msgtype(), "startup").into())
    })?
}

/// Response to an MD5 challenge.
///
/// `"md5" + md5_hex(md5_hex(password + user) + salt)`
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let mut hasher = Md5::new();
    hasher.update(password);
    hasher.update(user);
    let credentials = format!("{:x}", hasher.finalize_reset());

    hasher.update(credentials);
    hasher.update(salt);
    format!("md5{:x}", hasher.finalize())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn md5_challenge() {
        assert_eq!(
            md5_password("root", "password", [147, 24, 57, 152]),
            "md53e2c9d99d49b201ef867a36f3f9ed62c",
        );
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn ssl_without_tls_feature() {
        let err = open(&Config::new().ssl(true)).unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::Interface(InterfaceError::TlsUnavailable)));
    }
}
