//! `COPY` sub-protocol.
//!
//! ```text
//! COPY FROM STDIN:  CopyInResponse -> (CopyData)* -> CopyDone | CopyFail -> Sync
//! COPY TO STDOUT:   CopyOutResponse -> (CopyData)* -> CopyDone
//! ```
use std::io::{self, Read, Write};

use crate::{
    Result,
    common::verbose,
    connection::InterfaceError,
    postgres::frontend::{CopyData, CopyDone, CopyFail, Sync},
    transport::PgStream,
};

const CHUNK_SIZE: usize = 8 * 1024;

/// Caller side of a `COPY` statement.
pub enum CopyStream<'a> {
    /// Source for `COPY ... FROM STDIN`.
    In(&'a mut dyn Read),
    /// Sink for `COPY ... TO STDOUT`.
    Out(&'a mut dyn Write),
}

impl std::fmt::Debug for CopyStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In(_) => f.write_str("CopyStream::In"),
            Self::Out(_) => f.write_str("CopyStream::Out"),
        }
    }
}

/// Copy state of one command cycle.
pub(crate) struct CopyChannel<'a> {
    stream: Option<CopyStream<'a>>,
    /// Copy-out data is dropped after the sink failed or was missing.
    discard: bool,
}

impl<'a> CopyChannel<'a> {
    pub(crate) fn new(stream: Option<CopyStream<'a>>) -> Self {
        Self { stream, discard: false }
    }

    /// Stream the source to the server, ending with `CopyDone` and `Sync`.
    ///
    /// The server ignores the `Sync` that followed `Execute` while in
    /// copy-in mode, the one written here ends the cycle.
    pub(crate) fn copy_in(&mut self, stream: &mut PgStream) -> Result<()> {
        let Some(CopyStream::In(source)) = self.stream.as_mut() else {
            fail(stream, "no copy-in stream given")?;
            return Err(InterfaceError::MissingCopyStream { direction: "in" }.into());
        };

        let mut chunk = vec![0u8; CHUNK_SIZE];
        #[cfg(feature = "verbose")]
        let mut total = 0usize;
        loop {
            let n = match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    fail(stream, &format!("failed to read copy source: {err}"))?;
                    return Err(InterfaceError::CopySource(err).into());
                }
            };
            stream.send(CopyData { data: &chunk[..n] });
            stream.flush()?;
            #[cfg(feature = "verbose")]
            {
                total += n;
            }
        }

        verbose!(bytes = total, "copy in done");
        stream.send(CopyDone);
        stream.send(Sync);
        stream.flush()?;
        Ok(())
    }

    pub(crate) fn copy_out(&mut self) -> Result<()> {
        match self.stream {
            Some(CopyStream::Out(_)) => Ok(()),
            _ => {
                self.discard = true;
                Err(InterfaceError::MissingCopyStream { direction: "out" }.into())
            }
        }
    }

    pub(crate) fn data(&mut self, data: &[u8]) -> Result<()> {
        if self.discard {
            return Ok(());
        }
        let Some(CopyStream::Out(sink)) = self.stream.as_mut() else {
            return Ok(());
        };
        if let Err(err) = sink.write_all(data) {
            self.discard = true;
            return Err(InterfaceError::CopySink(err).into());
        }
        Ok(())
    }

    pub(crate) fn done(&mut self) -> Result<()> {
        if self.discard {
            return Ok(());
        }
        if let Some(CopyStream::Out(sink)) = self.stream.as_mut() {
            sink.flush().map_err(InterfaceError::CopySink)?;
        }
        Ok(())
    }
}

fn fail(stream: &mut PgStream, message: &str) -> io::Result<()> {
    stream.send(CopyFail { message });
    stream.send(Sync);
    stream.flush()
}
