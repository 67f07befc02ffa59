//! Outgoing message construction.

use chrono::{DateTime, FixedOffset, Local};
use rand::Rng;

use crate::encoding::{encode_base64_lines, encode_rfc2047, format_address, split_mailbox};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Longest line a 7bit body may carry (RFC 5322 section 2.1.1).
const MAX_7BIT_LINE: usize = 998;

/// Body transfer encoding chosen for the text part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// Base64 encoding.
    Base64,
}

impl TransferEncoding {
    /// Picks 7bit for short-lined ASCII and Base64 for anything else.
    #[must_use]
    pub fn for_text(text: &str) -> Self {
        let short_lines = text.lines().all(|line| line.len() <= MAX_7BIT_LINE);
        if text.is_ascii() && short_lines {
            Self::SevenBit
        } else {
            Self::Base64
        }
    }

    /// Returns the `Content-Transfer-Encoding` value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::Base64 => "base64",
        }
    }
}

/// A plain-text email wrapped in a `multipart/mixed` container.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    from: String,
    to: Vec<String>,
    cc: Vec<String>,
    subject: String,
    body: String,
    extra: Vec<(String, String)>,
    boundary: Option<String>,
    date: Option<DateTime<FixedOffset>>,
}

impl EmailMessage {
    /// Creates a message with one primary recipient.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: vec![to.into()],
            cc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            extra: Vec::new(),
            boundary: None,
            date: None,
        }
    }

    /// Adds another `To` recipient.
    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Adds a `Cc` recipient.
    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Adds a custom header. A header with the name of a generated one
    /// replaces it.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// Fixes the multipart boundary instead of drawing a random one.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Fixes the `Date` header instead of using the current local time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Returns the bare sender address.
    #[must_use]
    pub fn sender(&self) -> &str {
        split_mailbox(&self.from).1
    }

    /// Returns the bare addresses of every `To` and `Cc` recipient.
    #[must_use]
    pub fn recipients(&self) -> Vec<&str> {
        self.to
            .iter()
            .chain(&self.cc)
            .map(|mailbox| split_mailbox(mailbox).1)
            .collect()
    }

    /// Builds the top-level header block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] or [`Error::InvalidHeader`] for
    /// values that cannot be placed in a header.
    pub fn headers(&self, boundary: &str) -> Result<Headers> {
        let mut headers = Headers::new();
        headers.add("From", format_address(&self.from)?)?;
        headers.add("To", format_list(&self.to)?)?;
        if !self.cc.is_empty() {
            headers.add("Cc", format_list(&self.cc)?)?;
        }
        headers.add("Subject", encode_rfc2047(&self.subject, "utf-8"))?;
        let date = self
            .date
            .unwrap_or_else(|| Local::now().fixed_offset())
            .to_rfc2822();
        headers.add("Date", date)?;
        headers.add("MIME-Version", "1.0")?;
        headers.add(
            "Content-Type",
            format!("multipart/mixed; boundary=\"{boundary}\""),
        )?;

        for (name, value) in &self.extra {
            headers.set(name.as_str(), value.as_str())?;
        }
        Ok(headers)
    }

    /// Serializes the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] or [`Error::InvalidHeader`] for bad
    /// header material, and [`Error::InvalidBoundary`] if a fixed boundary is
    /// malformed or occurs in the body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = normalize_newlines(&self.body);
        let encoding = TransferEncoding::for_text(&body);
        let encoded = match encoding {
            TransferEncoding::SevenBit if body.is_empty() || body.ends_with("\r\n") => body,
            TransferEncoding::SevenBit => body + "\r\n",
            TransferEncoding::Base64 => encode_base64_lines(body.as_bytes()),
        };

        let boundary = match &self.boundary {
            Some(fixed) => {
                validate_boundary(fixed)?;
                if encoded.contains(fixed.as_str()) {
                    return Err(Error::InvalidBoundary(format!(
                        "{fixed:?} occurs in the body"
                    )));
                }
                fixed.clone()
            }
            None => loop {
                let candidate = random_boundary();
                if !encoded.contains(&candidate) {
                    break candidate;
                }
            },
        };

        let charset = match encoding {
            TransferEncoding::SevenBit => "us-ascii",
            TransferEncoding::Base64 => "utf-8",
        };

        let mut out = self.headers(&boundary)?.to_string();
        out.push_str("\r\n");
        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str(&format!("Content-Type: text/plain; charset=\"{charset}\"\r\n"));
        out.push_str(&format!(
            "Content-Transfer-Encoding: {}\r\n\r\n",
            encoding.as_str()
        ));
        out.push_str(&encoded);
        out.push_str(&format!("--{boundary}--\r\n"));
        Ok(out.into_bytes())
    }
}

fn format_list(mailboxes: &[String]) -> Result<String> {
    let formatted = mailboxes
        .iter()
        .map(|mailbox| format_address(mailbox))
        .collect::<Result<Vec<_>>>()?;
    Ok(formatted.join(", "))
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "\r\n")
}

fn random_boundary() -> String {
    let token: u64 = rand::thread_rng().r#gen();
    format!("==============={token:019}==")
}

/// Boundaries are 1 to 70 characters from the RFC 2046 `bchars` set, not
/// ending in a space.
fn validate_boundary(boundary: &str) -> Result<()> {
    const EXTRA: &[u8] = b"'()+_,-./:=? ";
    let valid = !boundary.is_empty()
        && boundary.len() <= 70
        && !boundary.ends_with(' ')
        && boundary
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || EXTRA.contains(&b));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidBoundary(format!("{boundary:?}")))
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

    fn fixed_date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-01T09:30:00+01:00").unwrap()
    }

    fn render(message: &EmailMessage) -> String {
        String::from_utf8(message.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_full_layout() {
        let message = EmailMessage::new("a@x.org", "b@y.org", "Hello", "Line one\nLine two")
            .boundary("XYZ")
            .date(fixed_date());

        assert_eq!(
            render(&message),
            "From: a@x.org\r\n\
             To: b@y.org\r\n\
             Subject: Hello\r\n\
             Date: Fri, 1 Mar 2024 09:30:00 +0100\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
             \r\n\
             --XYZ\r\n\
             Content-Type: text/plain; charset=\"us-ascii\"\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             Line one\r\nLine two\r\n\
             --XYZ--\r\n"
        );
    }

    #[test]
    fn test_utf8_body_is_base64() {
        let message = EmailMessage::new("a@x.org", "b@y.org", "Grüße", "Schöne Grüße")
            .boundary("XYZ")
            .date(fixed_date());
        let text = render(&message);

        assert!(text.contains("Subject: =?utf-8?B?R3LDvMOfZQ==?=\r\n"));
        assert!(text.contains("charset=\"utf-8\"\r\nContent-Transfer-Encoding: base64\r\n"));
        assert!(text.contains("U2Now7ZuZSBHcsO8w59l\r\n"));
    }

    #[test]
    fn test_cc_and_recipients() {
        let message = EmailMessage::new("Ann <a@x.org>", "Bob <b@y.org>", "s", "b")
            .to("c@z.org")
            .cc("Dee <d@w.org>")
            .boundary("XYZ");
        let text = render(&message);

        assert!(text.contains("From: Ann <a@x.org>\r\n"));
        assert!(text.contains("To: Bob <b@y.org>, c@z.org\r\n"));
        assert!(text.contains("Cc: Dee <d@w.org>\r\n"));
        assert_eq!(message.sender(), "a@x.org");
        assert_eq!(message.recipients(), vec!["b@y.org", "c@z.org", "d@w.org"]);
    }

    #[test]
    fn test_custom_headers() {
        let message = EmailMessage::new("a@x.org", "b@y.org", "s", "b")
            .header("X-Mailer", "postwire")
            .header("Subject", "Replaced")
            .boundary("XYZ");
        let text = render(&message);

        assert!(text.contains("X-Mailer: postwire\r\n"));
        assert!(text.contains("Subject: Replaced\r\n"));
        assert!(!text.contains("Subject: s\r\n"));
    }

    #[test]
    fn test_header_injection_rejected() {
        let message = EmailMessage::new("a@x.org", "b@y.org", "s", "b")
            .header("X-Evil", "1\r\nBcc: victim@example.com");
        assert!(matches!(message.to_bytes(), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_bad_boundary_rejected() {
        let message = EmailMessage::new("a@x.org", "b@y.org", "s", "--XYZ-- inside").boundary("XYZ");
        assert!(matches!(message.to_bytes(), Err(Error::InvalidBoundary(_))));

        let message = EmailMessage::new("a@x.org", "b@y.org", "s", "b").boundary("bad\"quote");
        assert!(matches!(message.to_bytes(), Err(Error::InvalidBoundary(_))));
    }

    #[test]
    fn test_random_boundary_shape() {
        let message = EmailMessage::new("a@x.org", "b@y.org", "s", "body");
        let text = render(&message);
        let boundary = random_boundary();
        assert!(boundary.starts_with("==="));
        assert!(validate_boundary(&boundary).is_ok());
        assert!(text.contains("Content-Type: multipart/mixed; boundary=\"==="));
        assert!(text.ends_with("==--\r\n"));
    }

    #[test]
    fn test_transfer_encoding_choice() {
        assert_eq!(TransferEncoding::for_text("plain"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::for_text("naïve"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::for_text(&"x".repeat(1200)),
            TransferEncoding::Base64
        );
    }
}
