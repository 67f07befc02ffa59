//! Header and body encoding utilities.
//!
//! Supports wrapped Base64 bodies, RFC 2047 encoded words and mailbox
//! formatting.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Maximum line length for Base64 bodies.
const BASE64_LINE_LENGTH: usize = 76;

/// Raw bytes per RFC 2047 encoded word; 45 bytes become 60 Base64
/// characters, keeping each word under 75 characters.
const ENCODED_WORD_BYTES: usize = 45;

/// Characters that force a display name into a quoted string.
const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

/// Encodes data as Base64 in CRLF-terminated lines of 76 characters.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2 + 2);

    // Base64 output is ASCII, so byte chunks are valid UTF-8.
    for line in encoded.as_bytes().chunks(BASE64_LINE_LENGTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str("\r\n");
    }
    out
}

/// Returns true if `text` must be RFC 2047 encoded to appear in a header.
#[must_use]
pub fn needs_encoding(text: &str) -> bool {
    !text.is_ascii() || text.contains("=?") || text.chars().any(char::is_control)
}

/// Encodes a header value using RFC 2047 `B` encoding when needed.
///
/// Format: `=?charset?B?encoded-text?=`, split into several space-separated
/// words so that none exceeds 75 characters. Text that can travel as is is
/// returned unchanged.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if !needs_encoding(text) {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (index, ch) in text.char_indices() {
        let next = index + ch.len_utf8();
        if next - start > ENCODED_WORD_BYTES && end > start {
            words.push(&text[start..end]);
            start = end;
        }
        end = next;
    }
    if end > start {
        words.push(&text[start..end]);
    }

    words
        .iter()
        .map(|word| format!("=?{charset}?B?{}?=", STANDARD.encode(word)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits `Name <addr>` into its display name and address.
///
/// A bare address has an empty display name.
#[must_use]
pub fn split_mailbox(input: &str) -> (&str, &str) {
    let input = input.trim();
    match (input.rfind('<'), input.ends_with('>')) {
        (Some(open), true) => {
            let name = input[..open].trim().trim_matches('"').trim();
            (name, input[open + 1..input.len() - 1].trim())
        }
        _ => ("", input),
    }
}

/// Formats a mailbox for an address header.
///
/// Accepts `addr@example.com`, `<addr@example.com>` or
/// `Display Name <addr@example.com>`. Display names with special characters
/// are quoted; non-ASCII names are RFC 2047 encoded.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] for an empty address or one containing
/// whitespace, angle brackets or line breaks.
pub fn format_address(input: &str) -> Result<String> {
    let (name, address) = split_mailbox(input);
    if address.is_empty() || address.contains(|c: char| c.is_whitespace() || c == '<' || c == '>')
    {
        return Err(Error::InvalidAddress(format!("{input:?}")));
    }
    if name.contains(['\r', '\n']) {
        return Err(Error::InvalidAddress(format!(
            "display name of {address} contains a line break"
        )));
    }

    Ok(if name.is_empty() {
        address.to_string()
    } else if needs_encoding(name) {
        format!("{} <{address}>", encode_rfc2047(name, "utf-8"))
    } else if name.contains(SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\" <{address}>")
    } else {
        format!("{name} <{address}>")
    })
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
    fn test_base64_lines() {
        assert_eq!(encode_base64_lines(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==\r\n");

        let encoded = encode_base64_lines(&[0u8; 120]);
        let lines: Vec<_> = encoded.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1].len(), 76);
        assert_eq!(lines[2].len(), 8);
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello", "utf-8"), "Hello");
        assert_eq!(encode_rfc2047("Héllo", "utf-8"), "=?utf-8?B?SMOpbGxv?=");
        assert!(encode_rfc2047("=?fake?=", "utf-8").starts_with("=?utf-8?B?"));
    }

    #[test]
    fn test_rfc2047_long_text_is_split() {
        let text = "é".repeat(60);
        let encoded = encode_rfc2047(&text, "utf-8");
        let words: Vec<_> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        for word in words {
            assert!(word.len() <= 75, "{word}");
        }
    }

    #[test]
    fn test_split_mailbox() {
        assert_eq!(split_mailbox("a@example.com"), ("", "a@example.com"));
        assert_eq!(split_mailbox("<a@example.com>"), ("", "a@example.com"));
        assert_eq!(
            split_mailbox("\"Ann Lee\" <a@example.com>"),
            ("Ann Lee", "a@example.com")
        );
    }

    #[test]
    fn test_format_address() {
        assert_eq!(format_address("a@example.com").unwrap(), "a@example.com");
        assert_eq!(format_address("<a@example.com>").unwrap(), "a@example.com");
        assert_eq!(
            format_address("Ann Lee <a@example.com>").unwrap(),
            "Ann Lee <a@example.com>"
        );
        assert_eq!(
            format_address("Lee, Ann <a@example.com>").unwrap(),
            "\"Lee, Ann\" <a@example.com>"
        );
        assert_eq!(
            format_address("Zoë <z@example.com>").unwrap(),
            "=?utf-8?B?Wm/Dqw==?= <z@example.com>"
        );
    }

    #[test]
    fn test_format_address_rejects_garbage() {
        assert!(format_address("").is_err());
        assert!(format_address("a b@example.com").is_err());
        assert!(format_address("a@example.com\r\nBcc: x@y").is_err());
    }

    proptest! {
        #[test]
        fn base64_lines_are_bounded(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode_base64_lines(&data);
            for line in encoded.split_terminator("\r\n") {
                prop_assert!(line.len() <= 76);
            }
            let joined: String = encoded.split_terminator("\r\n").collect();
            prop_assert_eq!(STANDARD.decode(joined).unwrap(), data);
        }
    }
}
