//! Byte transport: timed writes and length-capped line reads.
//!
//! Any I/O failure closes the transport before the error is returned, so a
//! caller never sees a half-usable connection.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use super::stream::MailStream;
use crate::error::{Error, Result};
use crate::parser::MAX_LINE_LENGTH;

/// Runs an I/O future under an optional time limit.
pub(crate) async fn within<T, F>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "operation timed out"))?,
        None => fut.await,
    }
}

fn not_connected() -> Error {
    Error::Disconnected("not connected; call connect() first".to_string())
}

/// Buffered connection to the server.
///
/// The transport is open while it holds a stream. Buffered input is kept
/// across calls so a read never loses bytes that arrived with an earlier line.
#[derive(Debug)]
pub struct Transport<S> {
    reader: Option<BufReader<S>>,
    timeout: Option<Duration>,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a closed transport.
    #[must_use]
    pub const fn new(timeout: Option<Duration>) -> Self {
        Self {
            reader: None,
            timeout,
        }
    }

    /// Creates an open transport over `stream`.
    #[must_use]
    pub fn with_stream(stream: S, timeout: Option<Duration>) -> Self {
        Self {
            reader: Some(BufReader::new(stream)),
            timeout,
        }
    }

    /// Attaches a new stream, dropping any previous one.
    pub fn attach(&mut self, stream: S) {
        self.reader = Some(BufReader::new(stream));
    }

    /// Returns true while a stream is attached.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Returns the underlying stream, if open.
    #[must_use]
    pub fn get_ref(&self) -> Option<&S> {
        self.reader.as_ref().map(BufReader::get_ref)
    }

    /// Writes all of `data` and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnected`] if the transport is closed, or if the
    /// write fails or times out (the transport is closed in that case).
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.timeout;
        let Some(reader) = self.reader.as_mut() else {
            return Err(not_connected());
        };

        let stream = reader.get_mut();
        let written = within(timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await;

        if let Err(e) = written {
            self.close();
            return Err(Error::Disconnected(format!("write failed: {e}")));
        }
        trace!(bytes = data.len(), "sent");
        Ok(())
    }

    /// Reads one line, terminator included.
    ///
    /// A line cut short by end of stream is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResponseTooLong`] if the line exceeds
    /// [`MAX_LINE_LENGTH`], or [`Error::Disconnected`] on end of stream, I/O
    /// failure or timeout. The transport is closed in every error case.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let timeout = self.timeout;
        let Some(reader) = self.reader.as_mut() else {
            return Err(not_connected());
        };

        match within(timeout, read_capped_line(reader)).await {
            Ok(line) if line.is_empty() => {
                self.close();
                Err(Error::Disconnected(
                    "connection unexpectedly closed".to_string(),
                ))
            }
            Ok(line) if line.len() > MAX_LINE_LENGTH => {
                self.close();
                Err(Error::ResponseTooLong)
            }
            Ok(line) => Ok(line),
            Err(e) => {
                self.close();
                Err(Error::Disconnected(format!("read failed: {e}")))
            }
        }
    }

    /// Drops the stream. Closing twice is harmless.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!("transport closed");
        }
    }
}

impl<S: MailStream> Transport<S> {
    /// Returns true if the attached stream is encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.get_ref().is_some_and(MailStream::is_encrypted)
    }

    /// Replaces the stream with a TLS session over it.
    ///
    /// Input buffered before the handshake is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnected`] if closed, [`Error::InvalidState`] if
    /// already encrypted, or the handshake error. A failed handshake leaves
    /// the transport closed.
    pub async fn upgrade(&mut self, server_name: &str) -> Result<()> {
        let Some(reader) = self.reader.take() else {
            return Err(not_connected());
        };
        if reader.get_ref().is_encrypted() {
            self.reader = Some(reader);
            return Err(Error::InvalidState(
                "connection is already encrypted".to_string(),
            ));
        }

        let handshake = reader.into_inner().start_tls(server_name);
        let upgraded = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| Error::Tls("TLS handshake timed out".to_string()))??,
            None => handshake.await?,
        };

        self.reader = Some(BufReader::new(upgraded));
        debug!(server_name, "transport upgraded to TLS");
        Ok(())
    }
}

/// Reads up to and including `\n`, stopping one byte past the line limit.
async fn read_capped_line<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(line);
        }

        let room = MAX_LINE_LENGTH + 1 - line.len();
        let window = &buf[..buf.len().min(room)];
        if let Some(pos) = window.iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&window[..=pos]);
            reader.consume(pos + 1);
            return Ok(line);
        }

        let taken = window.len();
        line.extend_from_slice(window);
        reader.consume(taken);

        if line.len() > MAX_LINE_LENGTH {
            return Ok(line);
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio_test::io::{Builder, Mock};

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

    #[tokio::test]
    async fn test_read_lines_in_order() {
        let mock = Builder::new()
            .read(b"250-first\r\n250 ")
            .read(b"second\r\n")
            .build();
        let mut transport = Transport::with_stream(mock, TIMEOUT);

        assert_eq!(transport.read_line().await.unwrap(), b"250-first\r\n");
        assert_eq!(transport.read_line().await.unwrap(), b"250 second\r\n");
        assert!(transport.is_open());
    }

    #[tokio::test]
    async fn test_partial_line_at_eof() {
        let mock = Builder::new().read(b"221 bye").build();
        let mut transport = Transport::with_stream(mock, TIMEOUT);

        assert_eq!(transport.read_line().await.unwrap(), b"221 bye");
        let err = transport.read_line().await.unwrap_err();
        assert!(matches!(err, Error::Disconnected(_)));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let mut line = vec![b'x'; MAX_LINE_LENGTH - 2];
        line.extend_from_slice(b"\r\n");
        let mock = Builder::new().read(&line).build();
        let mut transport = Transport::with_stream(mock, TIMEOUT);

        assert_eq!(transport.read_line().await.unwrap().len(), MAX_LINE_LENGTH);
    }

    #[tokio::test]
    async fn test_long_line_closes_transport() {
        let mut line = vec![b'x'; MAX_LINE_LENGTH + 8];
        line.extend_from_slice(b"\r\n");
        let mock = Builder::new().read(&line).build();
        let mut transport = Transport::with_stream(mock, TIMEOUT);

        let err = transport.read_line().await.unwrap_err();
        assert!(matches!(err, Error::ResponseTooLong));
        assert!(!transport.is_open());
        assert!(err.is_disconnected());
    }

    #[tokio::test]
    async fn test_send_writes_and_flushes() {
        let mock = Builder::new().write(b"NOOP\r\n").build();
        let mut transport = Transport::with_stream(mock, TIMEOUT);
        transport.send(b"NOOP\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_on_closed_transport() {
        let mut transport: Transport<Mock> = Transport::new(TIMEOUT);
        let err = transport.send(b"NOOP\r\n").await.unwrap_err();
        assert!(err.to_string().contains("not connected"));

        let err = transport.read_line().await.unwrap_err();
        assert!(matches!(err, Error::Disconnected(_)));
    }

    #[tokio::test]
    async fn test_write_failure_closes_transport() {
        let mock = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "broken"))
            .build();
        let mut transport = Transport::with_stream(mock, TIMEOUT);

        let err = transport.send(b"NOOP\r\n").await.unwrap_err();
        assert!(matches!(err, Error::Disconnected(_)));
        assert!(!transport.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_closes_transport() {
        let mock = Builder::new().wait(Duration::from_secs(10)).build();
        let mut transport = Transport::with_stream(mock, Some(Duration::from_secs(1)));

        let err = transport.read_line().await.unwrap_err();
        assert!(matches!(err, Error::Disconnected(_)));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mock = Builder::new().build();
        let mut transport = Transport::with_stream(mock, TIMEOUT);
        transport.close();
        transport.close();
        assert!(!transport.is_open());
    }
}
