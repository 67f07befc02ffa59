//! Session: the SMTP client state machine.
//!
//! A [`Session`] owns exactly one connection and walks it through greeting,
//! identification, optional STARTTLS, optional authentication and any number
//! of mail transactions.
//!
//! ```text
//! Disconnected ── connect() ──→ Connected ── identify() ──→ Identified ←──┐
//!                                                            │          │
//!                                   upgrade_security() ──→ Secured ─────┘
//!                                                                identify()
//! Identified ── login() ──→ Authenticated
//! Identified | Authenticated ── send_mail() ──→ InTransaction ──→ (back)
//! any ── quit() ──→ Closed
//! ```

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use crate::auth::{self, Credentials, Responder};
use crate::command::Command;
use crate::connection::{
    Channel, Config, MailStream, SmtpStream, Transport, address_literal, connect,
};
use crate::error::{Error, Result};
use crate::types::{AuthMechanism, Reply, ReplyCode, address_only};

/// Refused recipients of one transaction, keyed by address.
pub type RecipientOutcomes = BTreeMap<String, Reply>;

/// Identity sent with HELO when neither the configuration nor the socket
/// provides one.
const FALLBACK_IDENTITY: &str = "[127.0.0.1]";

const NO_PARAMS: [&str; 0] = [];

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No open connection.
    Disconnected,
    /// Greeting received.
    Connected,
    /// HELO accepted.
    Identified,
    /// STARTTLS completed; HELO must be sent again before anything else.
    Secured,
    /// AUTH completed.
    Authenticated,
    /// Inside `send_mail`.
    InTransaction,
    /// QUIT sent and the connection closed.
    Closed,
}

/// SMTP client session over a stream `S`.
#[derive(Debug)]
pub struct Session<S = SmtpStream> {
    config: Config,
    channel: Channel<S>,
    state: State,
    helo_reply: Option<Reply>,
    local_identity: String,
}

impl Session {
    /// Creates a disconnected session for TCP/TLS connections.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_config(config)
    }

    /// Opens the connection described by the configuration and reads the
    /// greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if already connected, [`Error::Connect`]
    /// if the connection cannot be opened or the greeting is not 220, and
    /// [`Error::Tls`] if an implicit TLS handshake fails.
    pub async fn connect(&mut self) -> Result<Reply> {
        if self.channel.is_open() {
            return Err(Error::InvalidState("already connected".to_string()));
        }
        let stream = connect(&self.config).await?;
        self.connect_with(stream).await
    }
}

impl<S: MailStream> Session<S> {
    /// Creates a disconnected session over any stream type.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        let channel = Channel::new(Transport::new(config.timeout));
        Self {
            config,
            channel,
            state: State::Disconnected,
            helo_reply: None,
            local_identity: FALLBACK_IDENTITY.to_string(),
        }
    }

    /// Attaches an already-open stream and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if already connected, [`Error::Connect`]
    /// for a zero timeout or a greeting other than 220, or any read error.
    pub async fn connect_with(&mut self, stream: S) -> Result<Reply> {
        if self.channel.is_open() {
            return Err(Error::InvalidState("already connected".to_string()));
        }
        self.config.io_timeout()?;

        self.local_identity = self
            .config
            .local_hostname
            .clone()
            .or_else(|| stream.local_addr().map(|addr| address_literal(addr.ip())))
            .unwrap_or_else(|| FALLBACK_IDENTITY.to_string());
        self.helo_reply = None;
        self.channel.transport_mut().attach(stream);

        let greeting = match self.channel.read_reply().await {
            Ok(reply) => reply,
            Err(e) => {
                self.channel.close();
                return Err(e);
            }
        };
        if greeting.code != ReplyCode::SERVICE_READY {
            self.channel.close();
            return Err(Error::Connect(format!(
                "unexpected greeting ({}): {}",
                greeting.code,
                greeting.message_text()
            )));
        }

        self.state = State::Connected;
        info!(host = %self.config.host, "connected");
        Ok(greeting)
    }

    /// Sends HELO unless a successful reply is cached for the open connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identification`] for a non-2xx reply (nothing is
    /// cached and the state is unchanged), or any channel error.
    pub async fn identify(&mut self) -> Result<Reply> {
        if !self.channel.is_open() {
            self.helo_reply = None;
        }
        if let Some(reply) = &self.helo_reply {
            return Ok(reply.clone());
        }

        let reply = self
            .channel
            .do_command(&Command::helo(&self.local_identity))
            .await?;
        if !reply.is_success() {
            return Err(Error::Identification {
                code: reply.code,
                message: reply.message_text(),
            });
        }

        self.helo_reply = Some(reply.clone());
        if matches!(self.state, State::Connected | State::Secured) {
            self.state = State::Identified;
        }
        debug!(identity = %self.local_identity, "identified");
        Ok(reply)
    }

    /// Upgrades the connection with STARTTLS.
    ///
    /// The cached HELO reply is dropped, so the next operation identifies
    /// again over the encrypted channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if already encrypted,
    /// [`Error::TlsUpgrade`] if the server does not answer 220, or the
    /// handshake error (the connection is closed in that case).
    pub async fn upgrade_security(&mut self) -> Result<Reply> {
        if self.channel.is_encrypted() {
            return Err(Error::InvalidState(
                "connection is already encrypted".to_string(),
            ));
        }
        self.identify().await?;

        let reply = self.channel.do_command(&Command::starttls()).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::TlsUpgrade {
                code: reply.code,
                message: reply.message_text(),
            });
        }

        let (server_name, _) = self.config.endpoint()?;
        self.channel.upgrade(&server_name).await?;
        self.helo_reply = None;
        self.state = State::Secured;
        info!(server_name, "connection secured with STARTTLS");
        Ok(reply)
    }

    /// Logs in with a password, trying PLAIN then LOGIN.
    ///
    /// # Errors
    ///
    /// See [`Self::login_with`].
    pub async fn login(&mut self, user: &str, password: &str) -> Result<Reply> {
        self.login_with(user, password, &AuthMechanism::DEFAULT_PREFERENCE)
            .await
    }

    /// Logs in trying each mechanism in order until one succeeds.
    ///
    /// Only [`Error::Authentication`] moves on to the next mechanism.
    ///
    /// # Errors
    ///
    /// Returns the last [`Error::Authentication`] if every mechanism was
    /// refused, [`Error::InvalidState`] for an empty list, or the first error
    /// of any other kind.
    pub async fn login_with(
        &mut self,
        user: &str,
        secret: &str,
        mechanisms: &[AuthMechanism],
    ) -> Result<Reply> {
        let mut last_error = None;

        for &mechanism in mechanisms {
            let mut credentials = Credentials::new(mechanism, user, secret);
            match self.authenticate(mechanism.as_str(), &mut credentials).await {
                Ok(reply) => return Ok(reply),
                Err(e @ Error::Authentication { .. }) => {
                    debug!(%mechanism, error = %e, "mechanism refused");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::InvalidState("no authentication mechanism to try".to_string())
        }))
    }

    /// Runs one AUTH exchange with a caller-supplied responder.
    ///
    /// # Errors
    ///
    /// See [`auth::authenticate`]; identification errors are returned first.
    pub async fn authenticate<R>(&mut self, mechanism: &str, responder: &mut R) -> Result<Reply>
    where
        R: Responder + ?Sized,
    {
        self.identify().await?;
        let reply = auth::authenticate(
            &mut self.channel,
            mechanism,
            responder,
            self.config.initial_response,
        )
        .await?;

        self.state = State::Authenticated;
        info!(mechanism, "authenticated");
        Ok(reply)
    }

    /// Sends one message to every recipient.
    ///
    /// Duplicate recipients are collapsed to their first occurrence. The
    /// returned map holds the recipients the server refused; it is empty when
    /// everyone was accepted.
    ///
    /// # Errors
    ///
    /// - [`Error::RecipientsRefused`] for an empty list (before any I/O),
    ///   when every recipient is refused, or when the server answers a RCPT
    ///   with 421
    /// - [`Error::SenderRefused`] if MAIL FROM is not accepted
    /// - [`Error::Data`] if DATA or the message content is not accepted
    /// - [`Error::InvalidCommand`] (before any I/O) if an address contains a
    ///   line break
    ///
    /// A 421 reply closes the connection; other refusals reset the
    /// transaction with RSET.
    pub async fn send_mail<A>(
        &mut self,
        from: &str,
        recipients: &[A],
        message: &[u8],
    ) -> Result<RecipientOutcomes>
    where
        A: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let recipients: Vec<&str> = recipients
            .iter()
            .map(AsRef::as_ref)
            .filter(|recipient| seen.insert(*recipient))
            .collect();
        if recipients.is_empty() {
            return Err(Error::RecipientsRefused(RecipientOutcomes::new()));
        }

        let mail = Command::mail_from(from, &NO_PARAMS);
        mail.serialize()?;
        let rcpts = recipients
            .iter()
            .map(|recipient| {
                let command = Command::rcpt_to(recipient, &NO_PARAMS);
                command.serialize().map(|_| (*recipient, command))
            })
            .collect::<Result<Vec<_>>>()?;

        self.identify().await?;
        let resume = self.state;
        self.state = State::InTransaction;
        let result = self.run_transaction(from, &mail, &rcpts, message).await;
        if self.state == State::InTransaction {
            self.state = resume;
        }
        result
    }

    async fn run_transaction(
        &mut self,
        from: &str,
        mail: &Command,
        rcpts: &[(&str, Command)],
        message: &[u8],
    ) -> Result<RecipientOutcomes> {
        let reply = self.channel.do_command(mail).await?;
        if reply.code != ReplyCode::OK {
            self.abort_transaction(reply.code).await;
            return Err(Error::SenderRefused {
                code: reply.code,
                message: reply.message_text(),
                sender: from.to_string(),
            });
        }

        let mut refused = RecipientOutcomes::new();
        for (recipient, command) in rcpts {
            let reply = self.channel.do_command(command).await?;
            let code = reply.code;
            if code != ReplyCode::OK && code != ReplyCode::FORWARD {
                debug!(recipient, %code, "recipient refused");
                refused.insert((*recipient).to_string(), reply);
            }
            if code == ReplyCode::SERVICE_UNAVAILABLE {
                self.channel.close();
                return Err(Error::RecipientsRefused(refused));
            }
        }

        if refused.len() == rcpts.len() {
            self.reset_quietly().await;
            return Err(Error::RecipientsRefused(refused));
        }

        let reply = self.channel.do_command(&Command::data()).await?;
        if reply.code != ReplyCode::START_DATA {
            self.abort_transaction(reply.code).await;
            return Err(Error::Data {
                code: reply.code,
                message: reply.message_text(),
            });
        }

        let reply = self.channel.send_message(message).await?;
        if reply.code != ReplyCode::OK {
            self.abort_transaction(reply.code).await;
            return Err(Error::Data {
                code: reply.code,
                message: reply.message_text(),
            });
        }

        info!(
            accepted = rcpts.len() - refused.len(),
            refused = refused.len(),
            "message accepted"
        );
        Ok(refused)
    }

    /// Closes on 421, otherwise resets the transaction.
    async fn abort_transaction(&mut self, code: ReplyCode) {
        if code == ReplyCode::SERVICE_UNAVAILABLE {
            warn!("server shutting down; closing connection");
            self.channel.close();
        } else {
            self.reset_quietly().await;
        }
    }

    async fn reset_quietly(&mut self) {
        if let Err(e) = self.channel.do_command(&Command::rset()).await {
            warn!(error = %e, "RSET failed");
        }
    }

    /// Sends MAIL FROM with optional ESMTP parameters.
    ///
    /// Like every raw command below, this is a single round trip that leaves
    /// the state machine untouched.
    ///
    /// # Errors
    ///
    /// Any channel error.
    pub async fn mail<P: AsRef<str>>(&mut self, sender: &str, parameters: &[P]) -> Result<Reply> {
        self.channel
            .do_command(&Command::mail_from(sender, parameters))
            .await
    }

    /// Sends RCPT TO with optional ESMTP parameters.
    ///
    /// # Errors
    ///
    /// Any channel error.
    pub async fn rcpt<P: AsRef<str>>(
        &mut self,
        recipient: &str,
        parameters: &[P],
    ) -> Result<Reply> {
        self.channel
            .do_command(&Command::rcpt_to(recipient, parameters))
            .await
    }

    /// Sends DATA and then the message, returning the final reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Data`] if DATA is not answered with 354, or any
    /// channel error.
    pub async fn data(&mut self, message: &[u8]) -> Result<Reply> {
        let reply = self.channel.do_command(&Command::data()).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Error::Data {
                code: reply.code,
                message: reply.message_text(),
            });
        }
        self.channel.send_message(message).await
    }

    /// Sends RSET.
    ///
    /// # Errors
    ///
    /// Any channel error.
    pub async fn rset(&mut self) -> Result<Reply> {
        self.channel.do_command(&Command::rset()).await
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Any channel error.
    pub async fn noop(&mut self) -> Result<Reply> {
        self.channel.do_command(&Command::noop()).await
    }

    /// Sends VRFY with the bare address.
    ///
    /// # Errors
    ///
    /// Any channel error.
    pub async fn verify(&mut self, address: &str) -> Result<Reply> {
        self.channel
            .do_command(&Command::vrfy(&address_only(address)))
            .await
    }

    /// Sends HELP, optionally about a topic.
    ///
    /// # Errors
    ///
    /// Any channel error.
    pub async fn help(&mut self, topic: &str) -> Result<Reply> {
        self.channel.do_command(&Command::help(topic)).await
    }

    /// Sends an arbitrary command; an empty argument is omitted.
    ///
    /// # Errors
    ///
    /// Any channel error.
    pub async fn command(&mut self, verb: &str, argument: &str) -> Result<Reply> {
        self.channel
            .do_command(&Command::with_argument(verb, argument))
            .await
    }

    /// Sends QUIT and closes the connection whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the QUIT round-trip error; the session is closed regardless.
    pub async fn quit(&mut self) -> Result<Reply> {
        let result = self.channel.do_command(&Command::quit()).await;
        self.channel.close();
        self.helo_reply = None;
        self.state = State::Closed;
        info!("session closed");
        result
    }

    /// Closes the connection without QUIT.
    pub fn close(&mut self) {
        self.channel.close();
        self.helo_reply = None;
        self.state = State::Disconnected;
    }

    /// Returns the current state.
    ///
    /// A connection lost underneath the session reads as
    /// [`State::Disconnected`].
    #[must_use]
    pub fn state(&self) -> State {
        if self.state != State::Closed && !self.channel.is_open() {
            State::Disconnected
        } else {
            self.state
        }
    }

    /// Returns true while the connection is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    /// Returns true if the connection is encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.channel.is_encrypted()
    }

    /// Returns the cached HELO reply while the connection is open.
    #[must_use]
    pub fn identification(&self) -> Option<&Reply> {
        self.helo_reply.as_ref().filter(|_| self.channel.is_open())
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
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
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use tokio_test::io::{Builder, Mock};

    fn config() -> Config {
        Config::builder("mx.example.com")
            .local_hostname("client.example.com")
            .build()
    }

    async fn session(mut builder: Builder) -> Session<Mock> {
        let mut session = Session::with_config(config());
        let mock = builder.build();
        session.connect_with(mock).await.unwrap();
        session
    }

    fn greeted() -> Builder {
        let mut builder = Builder::new();
        builder.read(b"220 mx.example.com ESMTP\r\n");
        builder
    }

    fn identified() -> Builder {
        let mut builder = greeted();
        builder
            .write(b"HELO client.example.com\r\n")
            .read(b"250 mx.example.com\r\n");
        builder
    }

    #[tokio::test]
    async fn test_connect_reads_greeting() {
        let mut session = Session::with_config(config());
        assert_eq!(session.state(), State::Disconnected);

        let greeting = session
            .connect_with(greeted().build())
            .await
            .unwrap();
        assert_eq!(greeting.code, ReplyCode::SERVICE_READY);
        assert_eq!(session.state(), State::Connected);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_bad_greeting_closes() {
        let mock = Builder::new().read(b"554 go away\r\n").build();
        let mut session: Session<Mock> = Session::with_config(config());

        let err = session.connect_with(mock).await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
        assert_eq!(session.state(), State::Disconnected);
    }

    #[tokio::test]
    async fn test_fallback_identity_without_socket() {
        let mut builder = greeted();
        builder
            .write(b"HELO [127.0.0.1]\r\n")
            .read(b"250 ok\r\n");
        let mut session = Session::with_config(Config::new("mx.example.com"));
        session.connect_with(builder.build()).await.unwrap();
        session.identify().await.unwrap();
    }

    #[tokio::test]
    async fn test_identify_is_cached() {
        let mut session = session(identified()).await;

        let first = session.identify().await.unwrap();
        let second = session.identify().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(session.state(), State::Identified);
        assert_eq!(session.identification(), Some(&first));
    }

    #[tokio::test]
    async fn test_identify_refused_is_not_cached() {
        let mut builder = greeted();
        builder
            .write(b"HELO client.example.com\r\n")
            .read(b"501 bad hostname\r\n")
            .write(b"HELO client.example.com\r\n")
            .read(b"250 ok\r\n");
        let mut session = session(builder).await;

        let err = session.identify().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Identification { code: ReplyCode::PARAMETER_ERROR, .. }
        ));
        assert_eq!(session.state(), State::Connected);
        assert!(session.identification().is_none());

        session.identify().await.unwrap();
        assert_eq!(session.state(), State::Identified);
    }

    #[tokio::test]
    async fn test_starttls_refused() {
        let mut builder = identified();
        builder
            .write(b"STARTTLS\r\n")
            .read(b"454 TLS not available\r\n");
        let mut session = session(builder).await;

        let err = session.upgrade_security().await.unwrap_err();
        assert!(matches!(err, Error::TlsUpgrade { code, .. } if code.as_i16() == 454));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_login_falls_back_to_login_mechanism() {
        let plain = format!("AUTH PLAIN {}\r\n", STANDARD.encode("\0user\0pass"));
        let login = format!("AUTH LOGIN {}\r\n", STANDARD.encode("user"));
        let password = format!("{}\r\n", STANDARD.encode("pass"));
        let mut builder = identified();
        builder
            .write(plain.as_bytes())
            .read(b"504 unrecognized mechanism\r\n")
            .write(login.as_bytes())
            .read(format!("334 {}\r\n", STANDARD.encode("Password:")).as_bytes())
            .write(password.as_bytes())
            .read(b"235 ok\r\n");
        let mut session = session(builder).await;

        let reply = session.login("user", "pass").await.unwrap();
        assert_eq!(reply.code, ReplyCode::AUTH_SUCCESS);
        assert_eq!(session.state(), State::Authenticated);
    }

    #[tokio::test]
    async fn test_login_returns_last_failure() {
        let plain = format!("AUTH PLAIN {}\r\n", STANDARD.encode("\0user\0bad"));
        let login = format!("AUTH LOGIN {}\r\n", STANDARD.encode("user"));
        let mut builder = identified();
        builder
            .write(plain.as_bytes())
            .read(b"535 no\r\n")
            .write(login.as_bytes())
            .read(b"504 not here either\r\n");
        let mut session = session(builder).await;

        let err = session.login("user", "bad").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Authentication { code: ReplyCode::PARAMETER_NOT_IMPLEMENTED, .. }
        ));
        assert_eq!(session.state(), State::Identified);
    }

    #[tokio::test]
    async fn test_login_stops_on_disconnect() {
        let plain = format!("AUTH PLAIN {}\r\n", STANDARD.encode("\0user\0pass"));
        let mut builder = identified();
        builder.write(plain.as_bytes());
        let mut session = session(builder).await;

        let err = session.login("user", "pass").await.unwrap_err();
        assert!(err.is_disconnected());
        assert_eq!(session.state(), State::Disconnected);
    }

    #[tokio::test]
    async fn test_empty_recipients_sends_nothing() {
        let mut session = session(greeted()).await;
        let none: [&str; 0] = [];

        let err = session
            .send_mail("a@x", &none, b"hi")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RecipientsRefused(ref map) if map.is_empty()));
    }

    #[tokio::test]
    async fn test_newline_in_recipient_sends_nothing() {
        let mut session = session(greeted()).await;

        let err = session
            .send_mail("a@x", &["b@y\r\nRSET"], b"hi")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
    }

    #[tokio::test]
    async fn test_sender_refused_resets() {
        let mut builder = identified();
        builder
            .write(b"MAIL FROM:<a@x>\r\n")
            .read(b"553 not allowed\r\n")
            .write(b"RSET\r\n")
            .read(b"250 flushed\r\n");
        let mut session = session(builder).await;

        let err = session.send_mail("a@x", &["b@y"], b"hi").await.unwrap_err();
        let Error::SenderRefused { code, sender, .. } = err else {
            panic!("expected SenderRefused");
        };
        assert_eq!(code, ReplyCode::MAILBOX_NAME_INVALID);
        assert_eq!(sender, "a@x");
        assert!(session.is_connected());
        assert_eq!(session.state(), State::Identified);
    }

    #[tokio::test]
    async fn test_sender_refused_421_closes_without_rset() {
        let mut builder = identified();
        builder
            .write(b"MAIL FROM:<a@x>\r\n")
            .read(b"421 shutting down\r\n");
        let mut session = session(builder).await;

        let err = session.send_mail("a@x", &["b@y"], b"hi").await.unwrap_err();
        assert!(err.is_transient());
        assert!(!session.is_connected());

        assert_eq!(session.state(), State::Disconnected);
        assert!(session.identification().is_none());
        let err = session.identify().await.unwrap_err();
        assert!(err.is_disconnected());
    }

    #[tokio::test]
    async fn test_failed_rset_keeps_original_error() {
        let mut builder = identified();
        builder
            .write(b"MAIL FROM:<a@x>\r\n")
            .read(b"550 no\r\n")
            .write(b"RSET\r\n");
        let mut session = session(builder).await;

        let err = session.send_mail("a@x", &["b@y"], b"hi").await.unwrap_err();
        assert!(matches!(err, Error::SenderRefused { .. }));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_duplicate_recipients_collapse() {
        let mut builder = identified();
        builder
            .write(b"MAIL FROM:<a@x>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<b@y>\r\n")
            .read(b"550 unknown\r\n")
            .write(b"RSET\r\n")
            .read(b"250 ok\r\n");
        let mut session = session(builder).await;

        let err = session
            .send_mail("a@x", &["b@y", "b@y"], b"hi")
            .await
            .unwrap_err();
        let Error::RecipientsRefused(refused) = err else {
            panic!("expected RecipientsRefused");
        };
        assert_eq!(refused.len(), 1);
    }

    #[tokio::test]
    async fn test_recipient_421_closes() {
        let mut builder = identified();
        builder
            .write(b"MAIL FROM:<a@x>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<b@y>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<c@z>\r\n")
            .read(b"421 closing\r\n");
        let mut session = session(builder).await;

        let err = session
            .send_mail("a@x", &["b@y", "c@z", "d@w"], b"hi")
            .await
            .unwrap_err();
        let Error::RecipientsRefused(refused) = err else {
            panic!("expected RecipientsRefused");
        };
        assert_eq!(refused.keys().collect::<Vec<_>>(), vec!["c@z"]);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_data_refused_resets() {
        let mut builder = identified();
        builder
            .write(b"MAIL FROM:<a@x>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<b@y>\r\n")
            .read(b"251 will forward\r\n")
            .write(b"DATA\r\n")
            .read(b"554 no data for you\r\n")
            .write(b"RSET\r\n")
            .read(b"250 ok\r\n");
        let mut session = session(builder).await;

        let err = session.send_mail("a@x", &["b@y"], b"hi").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Data { code: ReplyCode::TRANSACTION_FAILED, .. }
        ));
    }

    #[tokio::test]
    async fn test_message_refused_after_payload() {
        let mut builder = identified();
        builder
            .write(b"MAIL FROM:<a@x>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<b@y>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"hi\r\n.\r\n")
            .read(b"552 too big\r\n")
            .write(b"RSET\r\n")
            .read(b"250 ok\r\n");
        let mut session = session(builder).await;

        let err = session.send_mail("a@x", &["b@y"], b"hi").await.unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(session.state(), State::Identified);
    }

    #[tokio::test]
    async fn test_pass_through_commands() {
        let mut builder = greeted();
        builder
            .write(b"NOOP\r\n")
            .read(b"250 ok\r\n")
            .write(b"VRFY user@example.com\r\n")
            .read(b"252 cannot verify\r\n")
            .write(b"HELP\r\n")
            .read(b"214-Commands:\r\n214 HELO MAIL RCPT\r\n")
            .write(b"XCLIENT NAME=test\r\n")
            .read(b"502 no\r\n")
            .write(b"MAIL FROM:<a@x> SIZE=10\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<b@y>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RSET\r\n")
            .read(b"250 ok\r\n");
        let mut session = session(builder).await;

        assert_eq!(session.noop().await.unwrap().code, ReplyCode::OK);
        let reply = session.verify("User <user@example.com>").await.unwrap();
        assert_eq!(reply.code, ReplyCode::CANNOT_VERIFY);
        let reply = session.help("").await.unwrap();
        assert_eq!(reply.message.len(), 2);
        let reply = session.command("XCLIENT", "NAME=test").await.unwrap();
        assert_eq!(reply.code, ReplyCode::NOT_IMPLEMENTED);
        session.mail("a@x", &["SIZE=10"]).await.unwrap();
        session.rcpt("b@y", &NO_PARAMS).await.unwrap();
        session.rset().await.unwrap();
        assert_eq!(session.state(), State::Connected);
    }

    #[tokio::test]
    async fn test_data_pass_through() {
        let mut builder = greeted();
        builder
            .write(b"DATA\r\n")
            .read(b"354 go\r\n")
            .write(b"body\r\n.\r\n")
            .read(b"250 queued\r\n");
        let mut session = session(builder).await;

        let reply = session.data(b"body\n").await.unwrap();
        assert_eq!(reply.message_text(), "queued");
    }

    #[tokio::test]
    async fn test_quit_closes() {
        let mut builder = greeted();
        builder.write(b"QUIT\r\n").read(b"221 bye\r\n");
        let mut session = session(builder).await;

        let reply = session.quit().await.unwrap();
        assert_eq!(reply.code, ReplyCode::CLOSING);
        assert_eq!(session.state(), State::Closed);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_quit_closes_on_failure() {
        let mut builder = greeted();
        builder.write(b"QUIT\r\n");
        let mut session = session(builder).await;

        assert!(session.quit().await.is_err());
        assert_eq!(session.state(), State::Closed);
    }

    #[tokio::test]
    async fn test_commands_after_close_fail() {
        let mut session = session(greeted()).await;
        session.close();

        let err = session.noop().await.unwrap_err();
        assert!(matches!(err, Error::Disconnected(_)));
        assert_eq!(session.state(), State::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let mut session = session(greeted()).await;
        let err = session
            .connect_with(Builder::new().build())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
