//! Integration tests for the SMTP session.
//!
//! These tests use a mock stream to simulate SMTP server replies without
//! requiring a real server connection.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use postwire_smtp::{
    Config, Error, MAX_AUTH_CHALLENGES, MailStream, ReplyCode, Result, Session, State,
};

/// Mock stream that hands out one scripted chunk per read.
///
/// Chunks are not merged, so nothing is read ahead across a TLS upgrade.
#[derive(Debug)]
struct MockStream {
    /// Replies to return (in order).
    chunks: VecDeque<Vec<u8>>,
    /// Everything the client wrote.
    sent: Arc<Mutex<Vec<u8>>>,
    /// Server name of the last TLS handshake.
    tls_name: Arc<Mutex<Option<String>>>,
    encrypted: bool,
}

impl MockStream {
    fn new(replies: &[&str]) -> Self {
        Self {
            chunks: replies.iter().map(|r| r.as_bytes().to_vec()).collect(),
            sent: Arc::default(),
            tls_name: Arc::default(),
            encrypted: false,
        }
    }

    fn transcript(&self) -> Transcript {
        Transcript(Arc::clone(&self.sent))
    }
}

/// Handle on the bytes written by the client.
struct Transcript(Arc<Mutex<Vec<u8>>>);

impl Transcript {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Poll::Ready(Ok(()));
        };

        let to_read = chunk.len().min(buf.remaining());
        buf.put_slice(&chunk[..to_read]);
        if to_read < chunk.len() {
            let rest = chunk.split_off(to_read);
            self.chunks.push_front(rest);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl MailStream for MockStream {
    async fn start_tls(mut self, server_name: &str) -> Result<Self> {
        *self.tls_name.lock().unwrap() = Some(server_name.to_string());
        self.encrypted = true;
        Ok(self)
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

fn config() -> Config {
    Config::builder("mx.example.com")
        .local_hostname("client.example.com")
        .build()
}

async fn connected(replies: &[&str]) -> (Session<MockStream>, Transcript) {
    let stream = MockStream::new(replies);
    let transcript = stream.transcript();
    let mut session = Session::with_config(config());
    session.connect_with(stream).await.unwrap();
    (session, transcript)
}

#[tokio::test]
async fn test_partial_recipient_failure_is_returned() {
    let (mut session, transcript) = connected(&[
        "220 mx.example.com ESMTP\r\n",
        "250 ok\r\n",
        "250 sender ok\r\n",
        "250 b@y ok\r\n",
        "550 c@z unknown user\r\n",
        "354 end with .\r\n",
        "250 queued as 42\r\n",
        "221 bye\r\n",
    ])
    .await;

    let helo = session.identify().await.unwrap();
    assert_eq!(helo.message_text(), "ok");

    let refused = session
        .send_mail("a@x", &["b@y", "c@z"], b"Subject: hi\r\n\r\nhello\r\n")
        .await
        .unwrap();
    assert_eq!(refused.len(), 1);
    let reply = &refused["c@z"];
    assert_eq!(reply.code, ReplyCode::MAILBOX_UNAVAILABLE);
    assert_eq!(reply.message_text(), "c@z unknown user");

    session.quit().await.unwrap();
    assert_eq!(session.state(), State::Closed);

    assert_eq!(
        transcript.text(),
        "HELO client.example.com\r\n\
         MAIL FROM:<a@x>\r\n\
         RCPT TO:<b@y>\r\n\
         RCPT TO:<c@z>\r\n\
         DATA\r\n\
         Subject: hi\r\n\r\nhello\r\n.\r\n\
         QUIT\r\n"
    );
}

#[tokio::test]
async fn test_all_recipients_refused() {
    let (mut session, transcript) = connected(&[
        "220 mx.example.com ESMTP\r\n",
        "250 ok\r\n",
        "250 sender ok\r\n",
        "550 no such user\r\n",
        "450 mailbox busy\r\n",
        "250 reset\r\n",
    ])
    .await;

    let err = session
        .send_mail("a@x", &["b@y", "c@z"], b"hello")
        .await
        .unwrap_err();
    let Error::RecipientsRefused(refused) = err else {
        panic!("expected RecipientsRefused");
    };
    assert_eq!(refused.len(), 2);
    assert_eq!(refused["b@y"].code, ReplyCode::MAILBOX_UNAVAILABLE);
    assert_eq!(refused["c@z"].code, ReplyCode::MAILBOX_BUSY);

    assert_eq!(transcript.lines().last().map(String::as_str), Some("RSET"));
    assert!(!transcript.text().contains("DATA"));
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_starttls_forces_new_identification() {
    let creds = STANDARD.encode("\0user\0pass");
    let (mut session, transcript) = connected(&[
        "220 mx.example.com ESMTP\r\n",
        "250 hello\r\n",
        "220 ready to start TLS\r\n",
        "250 hello again\r\n",
        "235 authenticated\r\n",
    ])
    .await;

    session.identify().await.unwrap();
    session.upgrade_security().await.unwrap();
    assert_eq!(session.state(), State::Secured);
    assert!(session.is_encrypted());
    assert!(session.identification().is_none());

    session.login("user", "pass").await.unwrap();
    assert_eq!(session.state(), State::Authenticated);

    assert_eq!(
        transcript.lines(),
        vec![
            "HELO client.example.com".to_string(),
            "STARTTLS".to_string(),
            "HELO client.example.com".to_string(),
            format!("AUTH PLAIN {creds}"),
        ]
    );
}

#[tokio::test]
async fn test_starttls_uses_configured_host() {
    let stream = MockStream::new(&[
        "220 mx.example.com ESMTP\r\n",
        "250 hello\r\n",
        "220 go ahead\r\n",
    ]);
    let tls_name = Arc::clone(&stream.tls_name);
    let config = Config::builder("mx.example.com:2525")
        .local_hostname("client.example.com")
        .build();
    let mut session = Session::with_config(config);
    session.connect_with(stream).await.unwrap();

    session.upgrade_security().await.unwrap();
    assert_eq!(tls_name.lock().unwrap().as_deref(), Some("mx.example.com"));

    let err = session.upgrade_security().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn test_auth_loop_detected_on_sixth_round_trip() {
    let mut replies = vec!["220 mx.example.com ESMTP\r\n", "250 ok\r\n"];
    replies.extend(std::iter::repeat_n("334 \r\n", 10));
    let (mut session, transcript) = connected(&replies).await;

    let err = session.login("user", "pass").await.unwrap_err();
    let Error::AuthLoopDetected { code, .. } = err else {
        panic!("expected AuthLoopDetected");
    };
    assert_eq!(code, ReplyCode::AUTH_CONTINUE);

    let auth_round_trips = transcript.lines().len() - 1;
    assert_eq!(auth_round_trips, MAX_AUTH_CHALLENGES as usize + 1);
    assert!(transcript.lines()[1].starts_with("AUTH PLAIN "));
}

#[tokio::test]
async fn test_auth_loop_detected_on_sixth_round_trip_without_initial_response() {
    let mut replies = vec!["220 mx.example.com ESMTP\r\n", "250 ok\r\n"];
    replies.extend(std::iter::repeat_n("334 \r\n", 10));
    let stream = MockStream::new(&replies);
    let transcript = stream.transcript();
    let config = Config::builder("mx.example.com")
        .local_hostname("client.example.com")
        .initial_response(false)
        .build();
    let mut session = Session::with_config(config);
    session.connect_with(stream).await.unwrap();

    let err = session.login("user", "pass").await.unwrap_err();
    assert!(matches!(err, Error::AuthLoopDetected { .. }));

    let lines = transcript.lines();
    assert_eq!(lines.len() - 1, MAX_AUTH_CHALLENGES as usize + 1);
    assert_eq!(lines[1], "AUTH PLAIN");
}

#[tokio::test]
async fn test_overlong_reply_line_closes() {
    let long = format!("250 {}\r\n", "x".repeat(9000));
    let (mut session, _transcript) =
        connected(&["220 mx.example.com ESMTP\r\n", long.as_str()]).await;

    let err = session.noop().await.unwrap_err();
    assert!(matches!(err, Error::ResponseTooLong));
    assert!(!session.is_connected());
    assert_eq!(session.state(), State::Disconnected);
}

#[tokio::test]
async fn test_line_break_in_command_writes_nothing() {
    let (mut session, transcript) = connected(&["220 mx.example.com ESMTP\r\n"]).await;

    let err = session.command("NOOP", "x\r\nRSET").await.unwrap_err();
    assert!(matches!(err, Error::InvalidCommand(_)));
    let err = session.help("x\nRSET").await.unwrap_err();
    assert!(matches!(err, Error::InvalidCommand(_)));

    assert!(transcript.text().is_empty());
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_quit_closes_when_server_vanishes() {
    let (mut session, transcript) = connected(&["220 mx.example.com ESMTP\r\n"]).await;

    let err = session.quit().await.unwrap_err();
    assert!(err.is_disconnected());
    assert_eq!(session.state(), State::Closed);
    assert_eq!(transcript.text(), "QUIT\r\n");
}

#[tokio::test]
async fn test_zero_timeout_fails_before_io() {
    let stream = MockStream::new(&["220 mx.example.com ESMTP\r\n"]);
    let transcript = stream.transcript();
    let config = Config::builder("mx.example.com")
        .timeout(Duration::ZERO)
        .build();
    let mut session = Session::with_config(config);

    let err = session.connect_with(stream).await.unwrap_err();
    assert!(matches!(err, Error::Connect(_)));
    assert!(!session.is_connected());
    assert!(transcript.text().is_empty());
}

#[tokio::test]
async fn test_multiline_greeting() {
    let (session, _transcript) = connected(&[
        "220-mx.example.com ESMTP\r\n",
        "220-no UCE\r\n220 welcome\r\n",
    ])
    .await;
    assert_eq!(session.state(), State::Connected);
}
