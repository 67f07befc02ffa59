//! SASL authentication exchange (RFC 4954).
//!
//! The engine drives `AUTH` and its 334 challenge loop. What to answer each
//! challenge with is decided by a [`Responder`]: [`Credentials`] covers the
//! built-in mechanisms, and callers can plug in their own.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::command::Command;
use crate::connection::Channel;
use crate::error::{Error, Result};
use crate::types::{AuthMechanism, Reply, ReplyCode};

/// Round trips a server may keep challenging for; a 334 on the next one
/// means the exchange loops.
pub const MAX_AUTH_CHALLENGES: u32 = 5;

/// Produces the client side of a SASL exchange.
pub trait Responder {
    /// Returns the response sent with the AUTH command itself, if any.
    fn initial_response(&mut self) -> Option<Vec<u8>> {
        None
    }

    /// Answers a decoded server challenge.
    ///
    /// `round` counts exchanges so far: it is 1 for the first challenge
    /// after a bare AUTH and 2 for the first challenge after an AUTH that
    /// carried an initial response.
    fn respond(&mut self, challenge: &[u8], round: u32) -> Vec<u8>;
}

/// Username and secret for a built-in mechanism.
///
/// For XOAUTH2 the secret is the bearer token.
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    mechanism: AuthMechanism,
    user: &'a str,
    secret: &'a str,
}

impl<'a> Credentials<'a> {
    /// Creates a responder for `mechanism`.
    #[must_use]
    pub const fn new(mechanism: AuthMechanism, user: &'a str, secret: &'a str) -> Self {
        Self {
            mechanism,
            user,
            secret,
        }
    }

    /// Returns the mechanism these credentials answer for.
    #[must_use]
    pub const fn mechanism(&self) -> AuthMechanism {
        self.mechanism
    }

    fn plain(&self) -> Vec<u8> {
        format!("\0{}\0{}", self.user, self.secret).into_bytes()
    }

    fn xoauth2(&self) -> Vec<u8> {
        format!("user={}\x01auth=Bearer {}\x01\x01", self.user, self.secret).into_bytes()
    }
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("mechanism", &self.mechanism)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Responder for Credentials<'_> {
    fn initial_response(&mut self) -> Option<Vec<u8>> {
        Some(match self.mechanism {
            AuthMechanism::Plain => self.plain(),
            AuthMechanism::Login => self.user.as_bytes().to_vec(),
            AuthMechanism::XOAuth2 => self.xoauth2(),
        })
    }

    fn respond(&mut self, _challenge: &[u8], round: u32) -> Vec<u8> {
        match self.mechanism {
            AuthMechanism::Plain => self.plain(),
            AuthMechanism::Login if round < 2 => self.user.as_bytes().to_vec(),
            AuthMechanism::Login => self.secret.as_bytes().to_vec(),
            // A challenge here carries an error report; an empty answer
            // lets the server send its final status.
            AuthMechanism::XOAuth2 => Vec::new(),
        }
    }
}

/// Runs one AUTH exchange to completion.
///
/// Returns the final reply when it is 235 (authenticated) or 503 (already
/// authenticated).
///
/// # Errors
///
/// - [`Error::AuthLoopDetected`] if the server still challenges on the
///   round trip after [`MAX_AUTH_CHALLENGES`] (the sixth, counting the AUTH
///   command itself)
/// - [`Error::Authentication`] for any other final status
/// - [`Error::Protocol`] if a challenge is not valid base64 (the exchange is
///   cancelled first)
/// - any channel error
pub async fn authenticate<S, R>(
    channel: &mut Channel<S>,
    mechanism: &str,
    responder: &mut R,
    allow_initial_response: bool,
) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: Responder + ?Sized,
{
    let initial = if allow_initial_response {
        responder.initial_response()
    } else {
        None
    };

    let (mut reply, mut round) = match initial {
        Some(response) => {
            let encoded = STANDARD.encode(response);
            let command = Command::auth(mechanism, Some(&encoded));
            (channel.do_command(&command).await?, 1)
        }
        None => (channel.do_command(&Command::auth(mechanism, None)).await?, 0),
    };

    // Round trips so far, the AUTH command included.
    let mut exchanges = 1;
    while reply.code == ReplyCode::AUTH_CONTINUE {
        round += 1;
        let challenge = match decode_challenge(&reply) {
            Ok(challenge) => challenge,
            Err(e) => {
                cancel(channel).await;
                return Err(e);
            }
        };
        debug!(mechanism, round, "answering AUTH challenge");

        let response = STANDARD.encode(responder.respond(&challenge, round));
        reply = channel.do_command(&Command::auth_response(response)).await?;
        exchanges += 1;

        if exchanges > MAX_AUTH_CHALLENGES && reply.code == ReplyCode::AUTH_CONTINUE {
            return Err(Error::AuthLoopDetected {
                code: reply.code,
                message: reply.message_text(),
            });
        }
    }

    if reply.code == ReplyCode::AUTH_SUCCESS || reply.code == ReplyCode::BAD_SEQUENCE {
        Ok(reply)
    } else {
        Err(Error::Authentication {
            code: reply.code,
            message: reply.message_text(),
        })
    }
}

fn decode_challenge(reply: &Reply) -> Result<Vec<u8>> {
    let text: String = reply
        .message_text()
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(text)
        .map_err(|e| Error::Protocol(format!("undecodable AUTH challenge: {e}")))
}

/// Aborts a pending exchange with `*`; the reply is only logged.
async fn cancel<S>(channel: &mut Channel<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match channel.do_command(&Command::new("*")).await {
        Ok(reply) => debug!(code = %reply.code, "AUTH exchange cancelled"),
        Err(e) => warn!(error = %e, "failed to cancel AUTH exchange"),
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
    use crate::connection::Transport;
    use std::time::Duration;
    use tokio_test::io::{Builder, Mock};

    fn channel(mock: Mock) -> Channel<Mock> {
        Channel::new(Transport::with_stream(mock, Some(Duration::from_secs(5))))
    }

    fn b64(data: &str) -> String {
        STANDARD.encode(data)
    }

    #[test]
    fn test_plain_response() {
        let mut creds = Credentials::new(AuthMechanism::Plain, "user", "pass");
        assert_eq!(creds.initial_response().unwrap(), b"\0user\0pass");
        assert_eq!(creds.respond(b"", 1), b"\0user\0pass");
    }

    #[test]
    fn test_login_responses_by_round() {
        let mut creds = Credentials::new(AuthMechanism::Login, "user", "pass");
        assert_eq!(creds.initial_response().unwrap(), b"user");
        assert_eq!(creds.respond(b"Username:", 1), b"user");
        assert_eq!(creds.respond(b"Password:", 2), b"pass");
    }

    #[test]
    fn test_xoauth2_response() {
        let mut creds = Credentials::new(AuthMechanism::XOAuth2, "user@example.com", "tok");
        assert_eq!(
            creds.initial_response().unwrap(),
            b"user=user@example.com\x01auth=Bearer tok\x01\x01"
        );
        assert!(creds.respond(b"{\"status\":\"401\"}", 2).is_empty());
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = Credentials::new(AuthMechanism::Plain, "user", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_plain_with_initial_response() {
        let line = format!("AUTH PLAIN {}\r\n", b64("\0user\0pass"));
        let mock = Builder::new()
            .write(line.as_bytes())
            .read(b"235 2.7.0 Authentication successful\r\n")
            .build();
        let mut channel = channel(mock);
        let mut creds = Credentials::new(AuthMechanism::Plain, "user", "pass");

        let reply = authenticate(&mut channel, "PLAIN", &mut creds, true)
            .await
            .unwrap();
        assert_eq!(reply.code, ReplyCode::AUTH_SUCCESS);
    }

    #[tokio::test]
    async fn test_login_without_initial_response() {
        let user = format!("{}\r\n", b64("user"));
        let pass = format!("{}\r\n", b64("pass"));
        let mock = Builder::new()
            .write(b"AUTH LOGIN\r\n")
            .read(format!("334 {}\r\n", b64("Username:")).as_bytes())
            .write(user.as_bytes())
            .read(format!("334 {}\r\n", b64("Password:")).as_bytes())
            .write(pass.as_bytes())
            .read(b"235 ok\r\n")
            .build();
        let mut channel = channel(mock);
        let mut creds = Credentials::new(AuthMechanism::Login, "user", "pass");

        let reply = authenticate(&mut channel, "LOGIN", &mut creds, false)
            .await
            .unwrap();
        assert_eq!(reply.code, ReplyCode::AUTH_SUCCESS);
    }

    #[tokio::test]
    async fn test_login_with_initial_response() {
        let first = format!("AUTH LOGIN {}\r\n", b64("user"));
        let pass = format!("{}\r\n", b64("pass"));
        let mock = Builder::new()
            .write(first.as_bytes())
            .read(format!("334 {}\r\n", b64("Password:")).as_bytes())
            .write(pass.as_bytes())
            .read(b"235 ok\r\n")
            .build();
        let mut channel = channel(mock);
        let mut creds = Credentials::new(AuthMechanism::Login, "user", "pass");

        authenticate(&mut channel, "LOGIN", &mut creds, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_already_authenticated_is_success() {
        let line = format!("AUTH PLAIN {}\r\n", b64("\0user\0pass"));
        let mock = Builder::new()
            .write(line.as_bytes())
            .read(b"503 already authenticated\r\n")
            .build();
        let mut channel = channel(mock);
        let mut creds = Credentials::new(AuthMechanism::Plain, "user", "pass");

        let reply = authenticate(&mut channel, "PLAIN", &mut creds, true)
            .await
            .unwrap();
        assert_eq!(reply.code, ReplyCode::BAD_SEQUENCE);
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let line = format!("AUTH PLAIN {}\r\n", b64("\0user\0bad"));
        let mock = Builder::new()
            .write(line.as_bytes())
            .read(b"535 5.7.8 bad credentials\r\n")
            .build();
        let mut channel = channel(mock);
        let mut creds = Credentials::new(AuthMechanism::Plain, "user", "bad");

        let err = authenticate(&mut channel, "PLAIN", &mut creds, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Authentication { code: ReplyCode::AUTH_FAILED, .. }
        ));
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_endless_challenges_detected() {
        let initial = format!("AUTH PLAIN {}\r\n", b64("\0user\0pass"));
        let answer = format!("{}\r\n", b64("\0user\0pass"));
        let mut builder = Builder::new();
        builder.write(initial.as_bytes()).read(b"334 \r\n");
        for _ in 0..MAX_AUTH_CHALLENGES {
            builder.write(answer.as_bytes()).read(b"334 \r\n");
        }
        let mut channel = channel(builder.build());
        let mut creds = Credentials::new(AuthMechanism::Plain, "user", "pass");

        let err = authenticate(&mut channel, "PLAIN", &mut creds, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthLoopDetected { .. }));
    }

    #[tokio::test]
    async fn test_endless_challenges_without_initial_response() {
        let answer = format!("{}\r\n", b64("\0user\0pass"));
        let mut builder = Builder::new();
        builder.write(b"AUTH PLAIN\r\n").read(b"334 \r\n");
        for _ in 1..MAX_AUTH_CHALLENGES + 1 {
            builder.write(answer.as_bytes()).read(b"334 \r\n");
        }
        let mut channel = channel(builder.build());
        let mut creds = Credentials::new(AuthMechanism::Plain, "user", "pass");

        let err = authenticate(&mut channel, "PLAIN", &mut creds, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthLoopDetected { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_challenge_cancels() {
        let mock = Builder::new()
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 not base64!\r\n")
            .write(b"*\r\n")
            .read(b"501 cancelled\r\n")
            .build();
        let mut channel = channel(mock);
        let mut creds = Credentials::new(AuthMechanism::Login, "user", "pass");

        let err = authenticate(&mut channel, "LOGIN", &mut creds, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    struct Echo;

    impl Responder for Echo {
        fn respond(&mut self, challenge: &[u8], _round: u32) -> Vec<u8> {
            challenge.to_ascii_uppercase()
        }
    }

    #[tokio::test]
    async fn test_custom_responder() {
        let answer = format!("{}\r\n", b64("NONCE"));
        let mock = Builder::new()
            .write(b"AUTH X-ECHO\r\n")
            .read(format!("334 {}\r\n", b64("nonce")).as_bytes())
            .write(answer.as_bytes())
            .read(b"235 ok\r\n")
            .build();
        let mut channel = channel(mock);

        authenticate(&mut channel, "x-echo", &mut Echo, true)
            .await
            .unwrap();
    }
}
