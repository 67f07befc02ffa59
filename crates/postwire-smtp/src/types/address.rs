//! Envelope address normalization.
//!
//! SMTP envelopes carry bare paths (`<user@example.com>`), while callers
//! usually hold header-style mailboxes (`Jane Doe <user@example.com>`).
//! These helpers convert between the two without validating the address
//! syntax; the server is the authority on what it accepts.

/// Splits a mailbox into display name and address.
///
/// Returns `None` when the input is empty or does not look like either a
/// bare address or a `name <address>` pair.
fn parse_mailbox(input: &str) -> Option<(&str, &str)> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Some(open) = input.rfind('<') {
        let rest = &input[open + 1..];
        let close = rest.find('>')?;
        if !rest[close + 1..].trim().is_empty() {
            return None;
        }
        let name = input[..open].trim().trim_matches('"').trim();
        return Some((name, rest[..close].trim()));
    }

    if input.contains(['>', ' ', '\t']) {
        return None;
    }
    Some(("", input))
}

/// Quotes an address for use as a MAIL FROM or RCPT TO path.
///
/// - `Jane <jane@example.com>` becomes `<jane@example.com>`
/// - `jane@example.com` becomes `<jane@example.com>`
/// - an empty string becomes the null path `<>`
/// - input that cannot be parsed is wrapped in angle brackets, unless it
///   already starts with `<`, in which case it is returned unchanged
#[must_use]
pub fn quote_address(input: &str) -> String {
    match parse_mailbox(input) {
        Some((_, address)) => format!("<{address}>"),
        None if input.trim_start().starts_with('<') => input.to_string(),
        None => format!("<{input}>"),
    }
}

/// Returns the bare address without display name or angle brackets.
///
/// Input that cannot be parsed is returned unchanged.
#[must_use]
pub fn address_only(input: &str) -> String {
    parse_mailbox(input).map_or_else(|| input.to_string(), |(_, address)| address.to_string())
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

    #[test]
    fn test_quote_bare_address() {
        assert_eq!(quote_address("user@example.com"), "<user@example.com>");
        assert_eq!(quote_address("  user@example.com "), "<user@example.com>");
    }

    #[test]
    fn test_quote_mailbox() {
        assert_eq!(
            quote_address("John Doe <john@example.com>"),
            "<john@example.com>"
        );
        assert_eq!(
            quote_address("\"Doe, John\" <john@example.com>"),
            "<john@example.com>"
        );
        assert_eq!(quote_address("<john@example.com>"), "<john@example.com>");
    }

    #[test]
    fn test_quote_null_path() {
        assert_eq!(quote_address(""), "<>");
        assert_eq!(quote_address("<>"), "<>");
    }

    #[test]
    fn test_quote_unparsable() {
        assert_eq!(quote_address("<broken"), "<broken");
        assert_eq!(quote_address("two words"), "<two words>");
    }

    #[test]
    fn test_address_only() {
        assert_eq!(address_only("John <john@example.com>"), "john@example.com");
        assert_eq!(address_only("john@example.com"), "john@example.com");
        assert_eq!(address_only("<john@example.com>"), "john@example.com");
        assert_eq!(address_only("not parsable <x"), "not parsable <x");
        assert_eq!(address_only(""), "");
    }
}
