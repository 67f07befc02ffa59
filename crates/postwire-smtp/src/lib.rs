//! # postwire-smtp
//!
//! An async SMTP client core (RFC 5321).
//!
//! ## Features
//!
//! - **Reply decoding**: single and multi-line replies with a line-length cap
//! - **Command safety**: commands carrying CR or LF are refused before any
//!   byte is written
//! - **TLS**: implicit TLS (port 465) and in-place STARTTLS upgrade
//! - **Authentication**: PLAIN, LOGIN and XOAUTH2, plus any mechanism through
//!   a [`Responder`]
//! - **Transactions**: per-recipient outcomes, with partial refusal returned
//!   as a value and total refusal as an error
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_smtp::{Config, Security, Session};
//!
//! #[tokio::main]
//! async fn main() -> postwire_smtp::Result<()> {
//!     let config = Config::builder("smtp.example.com")
//!         .port(587)
//!         .security(Security::StartTls)
//!         .build();
//!
//!     let mut session = Session::new(config);
//!     session.connect().await?;
//!     session.upgrade_security().await?;
//!     session.login("user@example.com", "password").await?;
//!
//!     let refused = session
//!         .send_mail(
//!             "user@example.com",
//!             &["friend@example.org"],
//!             b"Subject: Test\r\n\r\nHello, World!\r\n",
//!         )
//!         .await?;
//!     for (recipient, reply) in &refused {
//!         eprintln!("{recipient}: {reply}");
//!     }
//!
//!     session.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL exchange and the [`Responder`] seam
//! - [`command`]: SMTP command builders and DATA framing
//! - [`connection`]: configuration, streams, transport and command channel
//! - [`parser`]: reply parser
//! - [`session`]: the client state machine
//! - [`types`]: replies, status codes, mechanisms and address helpers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod session;
pub mod types;

pub use auth::{Credentials, MAX_AUTH_CHALLENGES, Responder};
pub use connection::{Config, ConfigBuilder, MailStream, Security, SmtpStream};
pub use error::{Error, Result};
pub use session::{RecipientOutcomes, Session, State};
pub use types::{AuthMechanism, Reply, ReplyCode};
