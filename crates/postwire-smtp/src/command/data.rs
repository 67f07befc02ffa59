//! DATA payload framing.

use bytes::{BufMut, BytesMut};

/// Frames a message for transmission after a 354 reply.
///
/// Line endings are normalized to CRLF (bare LF and bare CR included), a
/// leading `.` on any line is doubled, a final CRLF is added if missing, and
/// the `.` CRLF terminator is appended.
#[must_use]
pub fn encode_data(message: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(message.len() + message.len() / 64 + 5);
    let mut at_line_start = true;
    let mut input = message.iter().copied().peekable();

    while let Some(byte) = input.next() {
        match byte {
            b'\r' => {
                input.next_if_eq(&b'\n');
                out.put_slice(b"\r\n");
                at_line_start = true;
            }
            b'\n' => {
                out.put_slice(b"\r\n");
                at_line_start = true;
            }
            _ => {
                if at_line_start && byte == b'.' {
                    out.put_u8(b'.');
                }
                out.put_u8(byte);
                at_line_start = false;
            }
        }
    }

    if !out.ends_with(b"\r\n") {
        out.put_slice(b"\r\n");
    }
    out.put_slice(b".\r\n");
    out
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
    fn test_terminator_appended() {
        assert_eq!(&encode_data(b"Hello\r\n")[..], b"Hello\r\n.\r\n");
        assert_eq!(&encode_data(b"Hello")[..], b"Hello\r\n.\r\n");
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(&encode_data(b"")[..], b"\r\n.\r\n");
    }

    #[test]
    fn test_leading_dots_are_doubled() {
        let framed = encode_data(b".hidden\r\nvisible\r\n..two\r\n.\r\n");
        assert_eq!(
            &framed[..],
            b"..hidden\r\nvisible\r\n...two\r\n..\r\n.\r\n"
        );
    }

    #[test]
    fn test_inner_dots_untouched() {
        assert_eq!(&encode_data(b"a.b. c\r\n")[..], b"a.b. c\r\n.\r\n");
    }

    #[test]
    fn test_line_endings_normalized() {
        assert_eq!(
            &encode_data(b"one\ntwo\rthree\r\n.four")[..],
            b"one\r\ntwo\r\nthree\r\n..four\r\n.\r\n"
        );
    }

    proptest! {
        #[test]
        fn framed_payload_is_transparent(message in proptest::collection::vec(any::<u8>(), 0..256)) {
            let framed = encode_data(&message);
            prop_assert!(framed.ends_with(b"\r\n.\r\n"));

            let body = &framed[..framed.len() - 3];
            for line in body.split(|&b| b == b'\n') {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                // A lone "." would end the transaction early.
                prop_assert_ne!(line, b".".as_slice());
                prop_assert!(!line.contains(&b'\r'));
            }
        }
    }
}
