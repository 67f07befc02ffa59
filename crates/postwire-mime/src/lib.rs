//! # postwire-mime
//!
//! Construction of outgoing RFC 5322 messages.
//!
//! ## Features
//!
//! - **Message building**: a plain-text body in a `multipart/mixed` container
//! - **Header safety**: field names and values are checked for line breaks
//! - **Encoding**: Base64 bodies and RFC 2047 encoded words for non-ASCII text
//! - **Addresses**: `Name <addr>` formatting with quoting where needed
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_mime::EmailMessage;
//!
//! let message = EmailMessage::new(
//!     "Ann <ann@example.com>",
//!     "bob@example.com",
//!     "Status",
//!     "All systems nominal.",
//! )
//! .cc("ops@example.com")
//! .header("X-Mailer", "postwire");
//!
//! let bytes = message.to_bytes()?;
//! let recipients = message.recipients();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod header;
mod message;

pub mod encoding;

pub use error::{Error, Result};
pub use header::Headers;
pub use message::{EmailMessage, TransferEncoding};
