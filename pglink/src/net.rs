//! Blocking socket.
use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

/// Connected socket, either tcp, unix or tls over tcp.
#[derive(Debug)]
pub enum Socket {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(feature = "tls")]
    Tls(Box<native_tls::TlsStream<TcpStream>>),
}

impl Socket {
    pub fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<Socket> {
        let stream = match timeout {
            None => TcpStream::connect((host, port))?,
            Some(timeout) => {
                let mut last = None;
                let mut stream = None;
                for addr in (host, port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(ok) => {
                            stream = Some(ok);
                            break;
                        }
                        Err(err) => last = Some(err),
                    }
                }
                match (stream, last) {
                    (Some(stream), _) => stream,
                    (None, Some(err)) => return Err(err),
                    (None, None) => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "host resolved to no address",
                        ));
                    }
                }
            }
        };
        stream.set_nodelay(true)?;
        Ok(Socket::Tcp(stream))
    }

    #[cfg(unix)]
    pub fn connect_unix(path: &std::path::Path) -> io::Result<Socket> {
        std::os::unix::net::UnixStream::connect(path).map(Socket::Unix)
    }

    /// Wrap a tcp socket in tls, after the server accepted the SSL request.
    #[cfg(feature = "tls")]
    pub fn upgrade(self, host: &str) -> crate::Result<Socket> {
        let Socket::Tcp(tcp) = self else {
            return Ok(self);
        };
        let connector = native_tls::TlsConnector::new()?;
        match connector.connect(host, tcp) {
            Ok(tls) => Ok(Socket::Tls(Box::new(tls))),
            Err(native_tls::HandshakeError::Failure(err)) => Err(err.into()),
            Err(native_tls::HandshakeError::WouldBlock(_)) => {
                Err(io::Error::from(io::ErrorKind::WouldBlock).into())
            }
        }
    }

    pub fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Socket::Tcp(tcp) => tcp.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Socket::Unix(unix) => unix.shutdown(Shutdown::Both),
            #[cfg(feature = "tls")]
            Socket::Tls(tls) => tls.shutdown(),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $s:ident => $e:expr) => {
        match $self {
            Socket::Tcp($s) => $e,
            #[cfg(unix)]
            Socket::Unix($s) => $e,
            #[cfg(feature = "tls")]
            Socket::Tls($s) => $e,
        }
    };
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        delegate!(self, s => s.read(buf))
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        delegate!(self, s => s.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        delegate!(self, s => s.flush())
    }
}
