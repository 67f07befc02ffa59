//! SMTP response parser.
//!
//! SMTP replies can be single-line or multi-line:
//! - Single: `250 OK\r\n`
//! - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
//!
//! Every line starts with a three-digit code. A `-` in the fourth position
//! marks a continuation; anything else ends the reply.

use crate::types::{Reply, ReplyCode};

/// Maximum reply line length in bytes, terminator included.
pub const MAX_LINE_LENGTH: usize = 8192;

/// One decoded reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyLine {
    /// More lines follow for the same reply.
    Continuation {
        /// Status code of this line.
        code: ReplyCode,
        /// Text after the four-byte prefix.
        text: String,
    },
    /// Last line of the reply.
    Final {
        /// Status code of the reply.
        code: ReplyCode,
        /// Text after the four-byte prefix.
        text: String,
    },
    /// The line does not start with a three-digit code.
    Invalid {
        /// Text after the four-byte prefix.
        text: String,
    },
}

impl ReplyLine {
    /// Decodes a raw line as read from the wire (terminator optional).
    #[must_use]
    pub fn parse(line: &[u8]) -> Self {
        let text = line
            .get(4..)
            .map(|tail| {
                String::from_utf8_lossy(tail)
                    .trim_matches([' ', '\t', '\r', '\n'])
                    .to_string()
            })
            .unwrap_or_default();

        let Some(code) = parse_code(line) else {
            return Self::Invalid { text };
        };

        if line.get(3) == Some(&b'-') {
            Self::Continuation { code, text }
        } else {
            Self::Final { code, text }
        }
    }
}

/// Reads the three leading ASCII digits of a reply line.
fn parse_code(line: &[u8]) -> Option<ReplyCode> {
    let digits = line.get(..3)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = digits
        .iter()
        .fold(0_i16, |acc, digit| acc * 10 + i16::from(digit - b'0'));
    Some(ReplyCode::new(code))
}

/// Accumulates reply lines until the reply is complete.
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    lines: Vec<String>,
}

impl ReplyAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Feeds one raw line.
    ///
    /// Returns the complete reply once a final line has been seen. An
    /// unparsable line completes the reply immediately with
    /// [`ReplyCode::INVALID_RESPONSE`].
    pub fn push(&mut self, line: &[u8]) -> Option<Reply> {
        match ReplyLine::parse(line) {
            ReplyLine::Continuation { text, .. } => {
                self.lines.push(text);
                None
            }
            ReplyLine::Final { code, text } => {
                self.lines.push(text);
                Some(Reply::new(code, std::mem::take(&mut self.lines)))
            }
            ReplyLine::Invalid { text } => {
                self.lines.push(text);
                Some(Reply::new(
                    ReplyCode::INVALID_RESPONSE,
                    std::mem::take(&mut self.lines),
                ))
            }
        }
    }
}

/// Parses a complete reply from raw lines.
///
/// Lines after the one that completes the reply are ignored. Returns `None`
/// if the lines end before the reply is complete.
#[must_use]
pub fn parse_reply<L: AsRef<[u8]>>(lines: &[L]) -> Option<Reply> {
    let mut assembler = ReplyAssembler::new();
    lines
        .iter()
        .find_map(|line| assembler.push(line.as_ref()))
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
    use proptest::prelude::*;

    #[test]
    fn test_parse_single_line_reply() {
        let reply = parse_reply(&["250 OK\r\n"]).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.message, vec!["OK"]);
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let lines = [
            "250-mail.example.com\r\n",
            "250-SIZE 35882577\r\n",
            "250 8BITMIME\r\n",
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(
            reply.message_text(),
            "mail.example.com\nSIZE 35882577\n8BITMIME"
        );
    }

    #[test]
    fn test_code_only_line() {
        let reply = parse_reply(&["250\r\n"]).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.message, vec![String::new()]);
    }

    #[test]
    fn test_text_is_trimmed() {
        let line = ReplyLine::parse(b"220 \t smtp.example.com ready  \r\n");
        assert_eq!(
            line,
            ReplyLine::Final {
                code: ReplyCode::SERVICE_READY,
                text: "smtp.example.com ready".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_code_stops_reply() {
        let lines = ["250-first\r\n", "ABC garbage\r\n", "250 never read\r\n"];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code, ReplyCode::INVALID_RESPONSE);
        assert_eq!(reply.message, vec!["first", "garbage"]);
    }

    #[test]
    fn test_short_and_signed_codes_are_invalid() {
        assert!(matches!(ReplyLine::parse(b"25\r\n"), ReplyLine::Invalid { .. }));
        assert!(matches!(ReplyLine::parse(b"\r\n"), ReplyLine::Invalid { .. }));
        assert!(matches!(ReplyLine::parse(b"+25 x\r\n"), ReplyLine::Invalid { .. }));
        assert!(matches!(ReplyLine::parse(b" 25 x\r\n"), ReplyLine::Invalid { .. }));
    }

    #[test]
    fn test_incomplete_reply() {
        assert!(parse_reply(&["250-more to come\r\n"]).is_none());
        assert!(parse_reply::<&str>(&[]).is_none());
    }

    #[test]
    fn test_non_utf8_text_is_lossy() {
        let line = ReplyLine::parse(b"550 bad \xff byte\r\n");
        let ReplyLine::Final { text, .. } = line else {
            panic!("expected final line");
        };
        assert!(text.starts_with("bad "));
        assert!(text.ends_with(" byte"));
    }

    proptest! {
        #[test]
        fn single_line_keeps_code_and_text(code in 200_i16..600, text in "[!-~]([ -~]{0,60}[!-~])?") {
            let raw = format!("{code} {text}\r\n");
            let reply = parse_reply(&[raw]).unwrap();
            prop_assert_eq!(reply.code, ReplyCode::new(code));
            prop_assert_eq!(reply.message_text(), text);
        }

        #[test]
        fn multiline_joins_in_order(
            code in 200_i16..600,
            texts in proptest::collection::vec("[!-~]{1,20}", 1..6),
        ) {
            let last = texts.len() - 1;
            let raw: Vec<String> = texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let sep = if i == last { ' ' } else { '-' };
                    format!("{code}{sep}{t}\r\n")
                })
                .collect();
            let reply = parse_reply(&raw).unwrap();
            prop_assert_eq!(reply.code, ReplyCode::new(code));
            prop_assert_eq!(reply.message_text(), texts.join("\n"));
        }
    }
}
