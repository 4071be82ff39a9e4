//! Scripted backend, speaking just enough of the protocol to drive the driver.
#![allow(dead_code)]
use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    thread::JoinHandle,
};

use pglink::Config;

pub const INT4: u32 = 23;
pub const INT8: u32 = 20;
pub const TEXT: u32 = 25;
pub const TIMESTAMP: u32 = 1114;

/// Server side of one connection.
pub struct Peer {
    stream: TcpStream,
    /// Transaction status sent in `ReadyForQuery`.
    pub status: u8,
}

/// Accept one connection on a background thread and run `script` on it.
pub fn serve<F>(script: F) -> (Config, JoinHandle<()>)
where
    F: FnOnce(Peer) + Send + 'static,
{
    serve_with(Config::new().user("alice").password("secret"), script)
}

/// Same as [`serve`], with `config` pointed at the listener.
pub fn serve_with<F>(config: Config, script: F) -> (Config, JoinHandle<()>)
where
    F: FnOnce(Peer) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(Peer { stream, status: b'I' });
    });
    (config.host("127.0.0.1").port(port), handle)
}

/// A received frontend message.
#[derive(Debug)]
pub struct Message {
    pub tag: u8,
    pub body: Vec<u8>,
}

impl Message {
    /// Nul terminated string fields.
    pub fn strings(&self) -> Vec<String> {
        self.body
            .split(|&b| b == 0)
            .map(|e| String::from_utf8_lossy(e).into_owned())
            .collect()
    }
}

impl Peer {
    pub fn read_startup(&mut self) -> Vec<String> {
        let mut len = [0u8; 4];
        self.stream.read_exact(&mut len).unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(len) as usize - 4];
        self.stream.read_exact(&mut body).unwrap();
        assert_eq!(&body[..4], &196608u32.to_be_bytes());
        body[4..]
            .split(|&b| b == 0)
            .filter(|e| !e.is_empty())
            .map(|e| String::from_utf8_lossy(e).into_owned())
            .collect()
    }

    /// Read the untagged SSL request, `reply` with a single byte.
    pub fn ssl_request(&mut self, reply: u8) {
        let mut request = [0u8; 8];
        self.stream.read_exact(&mut request).unwrap();
        assert_eq!(request[..4], 8u32.to_be_bytes());
        assert_eq!(request[4..], 80_877_103u32.to_be_bytes());
        self.stream.write_all(&[reply]).unwrap();
    }

    pub fn recv(&mut self) -> Message {
        let mut header = [0u8; 5];
        self.stream.read_exact(&mut header).unwrap();
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        let mut body = vec![0u8; len as usize - 4];
        self.stream.read_exact(&mut body).unwrap();
        Message { tag: header[0], body }
    }

    pub fn expect(&mut self, tag: u8) -> Message {
        let message = self.recv();
        assert_eq!(message.tag as char, tag as char, "unexpected frontend message");
        message
    }

    /// Read up to `Sync`, answering every `Close` up front.
    ///
    /// Returns the messages in between, without closes.
    pub fn cycle(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        let mut closes = 0;
        loop {
            let message = self.recv();
            match message.tag {
                b'S' => break,
                b'C' => closes += 1,
                _ => messages.push(message),
            }
        }
        for _ in 0..closes {
            self.send(b'3', &[]);
        }
        messages
    }

    pub fn send(&mut self, tag: u8, body: &[u8]) {
        let mut buf = vec![tag];
        buf.extend_from_slice(&(body.len() as u32 + 4).to_be_bytes());
        buf.extend_from_slice(body);
        self.stream.write_all(&buf).unwrap();
    }

    pub fn auth(&mut self, code: u32, extra: &[u8]) {
        let mut body = code.to_be_bytes().to_vec();
        body.extend_from_slice(extra);
        self.send(b'R', &body);
    }

    pub fn parameter_status(&mut self, name: &str, value: &str) {
        self.send(b'S', &[name.as_bytes(), b"\0", value.as_bytes(), b"\0"].concat());
    }

    pub fn ready(&mut self) {
        let status = self.status;
        self.send(b'Z', &[status]);
    }

    /// Trust authentication followed by the usual startup messages.
    pub fn handshake(&mut self) {
        self.read_startup();
        self.auth(0, &[]);
        self.parameter_status("server_version", "17.0");
        self.parameter_status("integer_datetimes", "on");
        self.send(b'K', &[0, 0, 0, 42, 0, 0, 0, 7]);
        self.ready();
    }

    pub fn row_description(&mut self, columns: &[(&str, u32)]) {
        let mut body = (columns.len() as u16).to_be_bytes().to_vec();
        for (name, oid) in columns {
            body.extend_from_slice(name.as_bytes());
            body.push(0);
            body.extend_from_slice(&0u32.to_be_bytes());
            body.extend_from_slice(&0i16.to_be_bytes());
            body.extend_from_slice(&oid.to_be_bytes());
            body.extend_from_slice(&(-1i16).to_be_bytes());
            body.extend_from_slice(&(-1i32).to_be_bytes());
            body.extend_from_slice(&0u16.to_be_bytes());
        }
        self.send(b'T', &body);
    }

    pub fn data_row(&mut self, values: &[Option<&[u8]>]) {
        let mut body = (values.len() as u16).to_be_bytes().to_vec();
        for value in values {
            match value {
                Some(value) => {
                    body.extend_from_slice(&(value.len() as i32).to_be_bytes());
                    body.extend_from_slice(value);
                }
                None => body.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        self.send(b'D', &body);
    }

    pub fn command_complete(&mut self, tag: &str) {
        self.send(b'C', &[tag.as_bytes(), b"\0"].concat());
    }

    pub fn error(&mut self, code: &str, message: &str) {
        self.fields(b'E', "ERROR", code, message);
    }

    pub fn notice(&mut self, message: &str) {
        self.fields(b'N', "NOTICE", "00000", message);
    }

    fn fields(&mut self, tag: u8, severity: &str, code: &str, message: &str) {
        let mut body = Vec::new();
        for (field, value) in [(b'S', severity), (b'V', severity), (b'C', code), (b'M', message)] {
            body.push(field);
            body.extend_from_slice(value.as_bytes());
            body.push(0);
        }
        body.push(0);
        self.send(tag, &body);
    }

    /// Answer a `Parse` + `Describe` cycle, returns the `Parse` message.
    pub fn prepare(&mut self, params: &[u32], columns: &[(&str, u32)]) -> Message {
        let mut messages = self.cycle().into_iter();
        let parse = messages.next().unwrap();
        assert_eq!(parse.tag, b'P');
        assert_eq!(messages.next().unwrap().tag, b'D');

        self.send(b'1', &[]);
        let mut desc = (params.len() as u16).to_be_bytes().to_vec();
        for oid in params {
            desc.extend_from_slice(&oid.to_be_bytes());
        }
        self.send(b't', &desc);
        match columns.is_empty() {
            true => self.send(b'n', &[]),
            false => self.row_description(columns),
        }
        self.ready();
        parse
    }

    /// Read a `Bind` + `Execute` cycle, returns both messages.
    pub fn bind(&mut self) -> (Message, Message) {
        let mut messages = self.cycle().into_iter();
        let bind = messages.next().unwrap();
        assert_eq!(bind.tag, b'B');
        let execute = messages.next().unwrap();
        assert_eq!(execute.tag, b'E');
        self.send(b'2', &[]);
        (bind, execute)
    }

    /// Answer a statement returning no rows.
    pub fn command(&mut self, tag: &str) {
        self.prepare(&[], &[]);
        self.bind();
        self.command_complete(tag);
        self.ready();
    }

    pub fn terminate(&mut self) {
        self.expect(b'X');
    }
}

/// Row limit of an `Execute` message.
pub fn max_row(execute: &Message) -> u32 {
    let limit = &execute.body[execute.body.len() - 4..];
    u32::from_be_bytes([limit[0], limit[1], limit[2], limit[3]])
}
