//! Error types for SMTP operations.

use crate::parser::MAX_LINE_LENGTH;
use crate::session::RecipientOutcomes;
use crate::types::ReplyCode;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport is closed, was never opened, or failed mid-operation.
    ///
    /// Raising this always leaves the connection closed.
    #[error("Server disconnected: {0}")]
    Disconnected(String),

    /// Connection establishment failed (bad timeout, bad port, refused
    /// connection, or a greeting other than 220).
    #[error("Connection failed: {0}")]
    Connect(String),

    /// A reply line exceeded the protocol line limit.
    #[error("Response line exceeds {} bytes", MAX_LINE_LENGTH)]
    ResponseTooLong,

    /// A reply line did not start with a three-digit status code.
    #[error("Invalid response from server: {0:?}")]
    InvalidResponse(String),

    /// The caller tried to send a command containing a line terminator.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    /// The server refused the HELO greeting.
    #[error("Server refused identification ({code}): {message}")]
    Identification {
        /// Reply code.
        code: ReplyCode,
        /// Reply text.
        message: String,
    },

    /// The server did not answer STARTTLS with 220.
    #[error("Server refused STARTTLS ({code}): {message}")]
    TlsUpgrade {
        /// Reply code.
        code: ReplyCode,
        /// Reply text.
        message: String,
    },

    /// TLS handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Authentication ended with a status other than 235 or 503.
    #[error("Authentication failed ({code}): {message}")]
    Authentication {
        /// Reply code.
        code: ReplyCode,
        /// Reply text.
        message: String,
    },

    /// The server kept issuing challenges past the round-trip limit.
    #[error("Server AUTH mechanism loops; last response ({code}): {message}")]
    AuthLoopDetected {
        /// Last reply code.
        code: ReplyCode,
        /// Last reply text.
        message: String,
    },

    /// The server refused the envelope sender.
    #[error("Sender {sender} refused ({code}): {message}")]
    SenderRefused {
        /// Reply code.
        code: ReplyCode,
        /// Reply text.
        message: String,
        /// The refused sender address.
        sender: String,
    },

    /// Every recipient was refused, or the server shut down mid-envelope.
    #[error("Recipients refused: {}", describe_outcomes(.0))]
    RecipientsRefused(RecipientOutcomes),

    /// The server refused the DATA command or the message content.
    #[error("Message data refused ({code}): {message}")]
    Data {
        /// Reply code.
        code: ReplyCode,
        /// Reply text.
        message: String,
    },

    /// Protocol error (unexpected or undecodable server data).
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns the server reply code carried by this error, if any.
    #[must_use]
    pub const fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            Self::Identification { code, .. }
            | Self::TlsUpgrade { code, .. }
            | Self::Authentication { code, .. }
            | Self::AuthLoopDetected { code, .. }
            | Self::SenderRefused { code, .. }
            | Self::Data { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.reply_code().is_some_and(ReplyCode::is_permanent)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.reply_code().is_some_and(ReplyCode::is_transient)
    }

    /// Returns true if the connection is gone after this error.
    ///
    /// A failed TLS handshake consumes the plaintext stream, so TLS and
    /// server-name errors count as disconnects.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(
            self,
            Self::Disconnected(_)
                | Self::ResponseTooLong
                | Self::InvalidResponse(_)
                | Self::Tls(_)
                | Self::InvalidDnsName(_)
        )
    }
}

fn describe_outcomes(outcomes: &RecipientOutcomes) -> String {
    if outcomes.is_empty() {
        return "no recipients".to_string();
    }
    outcomes
        .iter()
        .map(|(recipient, reply)| format!("{recipient} ({} {})", reply.code, reply.message_text()))
        .collect::<Vec<_>>()
        .join(", ")
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
    use crate::types::Reply;

    #[test]
    fn test_reply_code_and_class() {
        let err = Error::SenderRefused {
            code: ReplyCode::MAILBOX_UNAVAILABLE,
            message: "no such user".to_string(),
            sender: "a@example.com".to_string(),
        };
        assert_eq!(err.reply_code(), Some(ReplyCode::MAILBOX_UNAVAILABLE));
        assert!(err.is_permanent());
        assert!(!err.is_transient());

        let err = Error::Data {
            code: ReplyCode::MAILBOX_BUSY,
            message: "try later".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_disconnected_kinds() {
        assert!(Error::ResponseTooLong.is_disconnected());
        assert!(Error::Disconnected("gone".into()).is_disconnected());
        assert!(Error::Tls("handshake failed".into()).is_disconnected());
        assert!(!Error::InvalidCommand("x".into()).is_disconnected());
        assert_eq!(Error::ResponseTooLong.reply_code(), None);
    }

    #[test]
    fn test_recipients_refused_display() {
        let mut outcomes = RecipientOutcomes::new();
        outcomes.insert(
            "c@z".to_string(),
            Reply::new(ReplyCode::MAILBOX_UNAVAILABLE, vec!["unknown".to_string()]),
        );
        let err = Error::RecipientsRefused(outcomes);
        assert_eq!(err.to_string(), "Recipients refused: c@z (550 unknown)");

        let err = Error::RecipientsRefused(RecipientOutcomes::new());
        assert_eq!(err.to_string(), "Recipients refused: no recipients");
    }
}
