//! SMTP command builder.

mod data;

pub use data::encode_data;

use crate::error::{Error, Result};
use crate::types::quote_address;

/// SMTP command: a verb and an optional single-line argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    argument: Option<String>,
    sensitive: bool,
}

impl Command {
    /// Creates a command without argument.
    #[must_use]
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            argument: None,
            sensitive: false,
        }
    }

    /// Creates a command with an argument. An empty argument is omitted.
    #[must_use]
    pub fn with_argument(verb: impl Into<String>, argument: impl Into<String>) -> Self {
        let argument = argument.into();
        Self {
            verb: verb.into(),
            argument: (!argument.is_empty()).then_some(argument),
            sensitive: false,
        }
    }

    /// HELO - Simple greeting
    #[must_use]
    pub fn helo(hostname: &str) -> Self {
        Self::with_argument("HELO", hostname)
    }

    /// STARTTLS - Upgrade to TLS
    #[must_use]
    pub fn starttls() -> Self {
        Self::new("STARTTLS")
    }

    /// AUTH - Begin authentication, optionally with an encoded initial response
    #[must_use]
    pub fn auth(mechanism: &str, initial_response: Option<&str>) -> Self {
        let mechanism = mechanism.to_uppercase();
        let mut cmd = match initial_response {
            Some(response) => Self::with_argument("AUTH", format!("{mechanism} {response}")),
            None => Self::with_argument("AUTH", mechanism),
        };
        cmd.sensitive = initial_response.is_some();
        cmd
    }

    /// Encoded SASL response, sent as the entire command line.
    #[must_use]
    pub fn auth_response(encoded: impl Into<String>) -> Self {
        Self {
            verb: encoded.into(),
            argument: None,
            sensitive: true,
        }
    }

    /// MAIL FROM - Start mail transaction, with optional ESMTP parameters
    #[must_use]
    pub fn mail_from<P: AsRef<str>>(sender: &str, parameters: &[P]) -> Self {
        Self::with_argument("MAIL", envelope_argument("FROM:", sender, parameters))
    }

    /// RCPT TO - Add recipient, with optional ESMTP parameters
    #[must_use]
    pub fn rcpt_to<P: AsRef<str>>(recipient: &str, parameters: &[P]) -> Self {
        Self::with_argument("RCPT", envelope_argument("TO:", recipient, parameters))
    }

    /// DATA - Begin message data
    #[must_use]
    pub fn data() -> Self {
        Self::new("DATA")
    }

    /// RSET - Reset transaction
    #[must_use]
    pub fn rset() -> Self {
        Self::new("RSET")
    }

    /// VRFY - Verify address
    #[must_use]
    pub fn vrfy(address: &str) -> Self {
        Self::with_argument("VRFY", address)
    }

    /// HELP - Ask the server for help, optionally on a topic
    #[must_use]
    pub fn help(topic: &str) -> Self {
        Self::with_argument("HELP", topic)
    }

    /// NOOP - No operation
    #[must_use]
    pub fn noop() -> Self {
        Self::new("NOOP")
    }

    /// QUIT - Close connection
    #[must_use]
    pub fn quit() -> Self {
        Self::new("QUIT")
    }

    /// Returns the verb.
    #[must_use]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Returns true if the command line carries credentials.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Returns the command line without terminator.
    #[must_use]
    pub fn line(&self) -> String {
        match &self.argument {
            Some(argument) => format!("{} {argument}", self.verb),
            None => self.verb.clone(),
        }
    }

    /// Returns the line as it may appear in logs.
    #[must_use]
    pub fn log_line(&self) -> String {
        if !self.sensitive {
            return self.line();
        }
        if self.verb.eq_ignore_ascii_case("AUTH") {
            let mechanism = self
                .argument
                .as_deref()
                .and_then(|arg| arg.split_whitespace().next())
                .unwrap_or_default();
            format!("AUTH {mechanism} <redacted>")
        } else {
            "<redacted>".to_string()
        }
    }

    /// Serializes the command to bytes, CRLF included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommand`] if the verb or argument contains a
    /// CR or LF character.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let line = self.line();
        if line.contains(['\r', '\n']) {
            let escaped = line.replace('\n', "\\n").replace('\r', "\\r");
            return Err(Error::InvalidCommand(format!(
                "command and arguments contain prohibited newline characters: {escaped}"
            )));
        }

        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        Ok(buf)
    }
}

fn envelope_argument<P: AsRef<str>>(prefix: &str, address: &str, parameters: &[P]) -> String {
    let mut argument = format!("{prefix}{}", quote_address(address));
    for parameter in parameters {
        argument.push(' ');
        argument.push_str(parameter.as_ref());
    }
    argument
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

    const NO_PARAMS: [&str; 0] = [];

    #[test]
    fn test_helo_command() {
        let cmd = Command::helo("client.example.com");
        assert_eq!(cmd.serialize().unwrap(), b"HELO client.example.com\r\n");
    }

    #[test]
    fn test_bare_verbs() {
        assert_eq!(Command::starttls().serialize().unwrap(), b"STARTTLS\r\n");
        assert_eq!(Command::data().serialize().unwrap(), b"DATA\r\n");
        assert_eq!(Command::rset().serialize().unwrap(), b"RSET\r\n");
        assert_eq!(Command::noop().serialize().unwrap(), b"NOOP\r\n");
        assert_eq!(Command::quit().serialize().unwrap(), b"QUIT\r\n");
    }

    #[test]
    fn test_empty_argument_is_omitted() {
        assert_eq!(Command::help("").serialize().unwrap(), b"HELP\r\n");
        assert_eq!(Command::with_argument("NOOP", "").line(), "NOOP");
    }

    #[test]
    fn test_auth_commands() {
        let cmd = Command::auth("plain", Some("AHVzZXIAcGFzcw=="));
        assert_eq!(cmd.serialize().unwrap(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
        assert!(cmd.is_sensitive());
        assert_eq!(cmd.log_line(), "AUTH PLAIN <redacted>");

        let cmd = Command::auth("LOGIN", None);
        assert_eq!(cmd.serialize().unwrap(), b"AUTH LOGIN\r\n");
        assert!(!cmd.is_sensitive());
    }

    #[test]
    fn test_auth_response_is_whole_line() {
        let cmd = Command::auth_response("cGFzc3dvcmQ=");
        assert_eq!(cmd.serialize().unwrap(), b"cGFzc3dvcmQ=\r\n");
        assert_eq!(cmd.log_line(), "<redacted>");
    }

    #[test]
    fn test_mail_from() {
        let cmd = Command::mail_from("Sender <sender@example.com>", &NO_PARAMS);
        assert_eq!(
            cmd.serialize().unwrap(),
            b"MAIL FROM:<sender@example.com>\r\n"
        );

        let cmd = Command::mail_from("sender@example.com", &["BODY=8BITMIME", "SIZE=12345"]);
        assert_eq!(
            cmd.serialize().unwrap(),
            b"MAIL FROM:<sender@example.com> BODY=8BITMIME SIZE=12345\r\n"
        );
    }

    #[test]
    fn test_null_reverse_path() {
        let cmd = Command::mail_from("", &NO_PARAMS);
        assert_eq!(cmd.serialize().unwrap(), b"MAIL FROM:<>\r\n");
    }

    #[test]
    fn test_rcpt_to() {
        let cmd = Command::rcpt_to("recipient@example.com", &NO_PARAMS);
        assert_eq!(
            cmd.serialize().unwrap(),
            b"RCPT TO:<recipient@example.com>\r\n"
        );
    }

    #[test]
    fn test_vrfy() {
        let cmd = Command::vrfy("postmaster");
        assert_eq!(cmd.serialize().unwrap(), b"VRFY postmaster\r\n");
        assert_eq!(cmd.verb(), "VRFY");
    }

    #[test]
    fn test_line_terminators_rejected() {
        let err = Command::helo("evil\r\nRSET").serialize().unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
        assert!(err.to_string().contains("evil\\r\\nRSET"));

        assert!(Command::new("NO\nOP").serialize().is_err());
        assert!(Command::rcpt_to("a@b\r\nRSET", &NO_PARAMS).serialize().is_err());
    }
}
