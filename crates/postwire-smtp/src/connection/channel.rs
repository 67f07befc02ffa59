//! Command channel: one command out, one reply back.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::stream::MailStream;
use super::transport::Transport;
use crate::command::{Command, encode_data};
use crate::error::{Error, Result};
use crate::parser::ReplyAssembler;
use crate::types::{Reply, ReplyCode};

/// Command/reply exchange over a [`Transport`].
#[derive(Debug)]
pub struct Channel<S> {
    transport: Transport<S>,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a transport.
    #[must_use]
    pub const fn new(transport: Transport<S>) -> Self {
        Self { transport }
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &Transport<S> {
        &self.transport
    }

    /// Returns the transport mutably.
    pub const fn transport_mut(&mut self) -> &mut Transport<S> {
        &mut self.transport
    }

    /// Returns true while the transport is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Sends a command without waiting for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommand`] before writing anything if the line
    /// contains CR or LF, otherwise any transport error.
    pub async fn put_command(&mut self, command: &Command) -> Result<()> {
        let line = command.serialize()?;
        debug!("C: {}", command.log_line());
        self.transport.send(&line).await
    }

    /// Reads one complete reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] (closing the transport) if a line
    /// has no three-digit code, otherwise any transport error.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let mut assembler = ReplyAssembler::new();
        loop {
            let line = self.transport.read_line().await?;
            let Some(reply) = assembler.push(&line) else {
                continue;
            };

            if reply.code == ReplyCode::INVALID_RESPONSE {
                self.transport.close();
                return Err(Error::InvalidResponse(reply.message_text()));
            }
            debug!("S: {reply}");
            return Ok(reply);
        }
    }

    /// Sends a command and reads its reply.
    ///
    /// # Errors
    ///
    /// See [`Self::put_command`] and [`Self::read_reply`].
    pub async fn do_command(&mut self, command: &Command) -> Result<Reply> {
        self.put_command(command).await?;
        self.read_reply().await
    }

    /// Sends a message body after a 354 reply and reads the final reply.
    ///
    /// # Errors
    ///
    /// Any transport or reply error.
    pub async fn send_message(&mut self, message: &[u8]) -> Result<Reply> {
        let framed = encode_data(message);
        debug!(bytes = framed.len(), "C: <message data>");
        self.transport.send(&framed).await?;
        self.read_reply().await
    }

    /// Closes the transport.
    pub fn close(&mut self) {
        self.transport.close();
    }
}

impl<S: MailStream> Channel<S> {
    /// Returns true if the transport is encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.transport.is_encrypted()
    }

    /// Upgrades the transport to TLS.
    ///
    /// # Errors
    ///
    /// See [`Transport::upgrade`].
    pub async fn upgrade(&mut self, server_name: &str) -> Result<()> {
        self.transport.upgrade(server_name).await
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
    use std::time::Duration;
    use tokio_test::io::{Builder, Mock};

    fn channel(mock: Mock) -> Channel<Mock> {
        Channel::new(Transport::with_stream(mock, Some(Duration::from_secs(5))))
    }

    #[tokio::test]
    async fn test_do_command_single_line() {
        let mock = Builder::new()
            .write(b"NOOP\r\n")
            .read(b"250 OK\r\n")
            .build();
        let mut channel = channel(mock);

        let reply = channel.do_command(&Command::noop()).await.unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.message, vec!["OK"]);
    }

    #[tokio::test]
    async fn test_read_multiline_reply() {
        let mock = Builder::new()
            .write(b"HELO client\r\n")
            .read(b"250-mail.example.com\r\n250-SIZE 1000\r\n")
            .read(b"250 HELP\r\n")
            .build();
        let mut channel = channel(mock);

        let reply = channel.do_command(&Command::helo("client")).await.unwrap();
        assert_eq!(reply.message, vec!["mail.example.com", "SIZE 1000", "HELP"]);
    }

    #[tokio::test]
    async fn test_invalid_reply_closes() {
        let mock = Builder::new()
            .write(b"NOOP\r\n")
            .read(b"hello there\r\n")
            .build();
        let mut channel = channel(mock);

        let err = channel.do_command(&Command::noop()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn test_newline_in_command_writes_nothing() {
        let mock = Builder::new().build();
        let mut channel = channel(mock);

        let err = channel
            .put_command(&Command::helo("x\r\nQUIT"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_send_message_frames_payload() {
        let mock = Builder::new()
            .write(b"Subject: hi\r\n\r\n..dot\r\n.\r\n")
            .read(b"250 queued\r\n")
            .build();
        let mut channel = channel(mock);

        let reply = channel
            .send_message(b"Subject: hi\n\n.dot\n")
            .await
            .unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
    }

    #[tokio::test]
    async fn test_eof_mid_reply() {
        let mock = Builder::new().read(b"250-partial\r\n").build();
        let mut channel = channel(mock);

        let err = channel.read_reply().await.unwrap_err();
        assert!(err.is_disconnected());
        assert!(!channel.is_open());
    }
}
