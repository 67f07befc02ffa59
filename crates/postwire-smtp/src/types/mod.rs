//! Core SMTP types.

mod address;
mod mechanism;
mod reply;

pub use address::{address_only, quote_address};
pub use mechanism::AuthMechanism;
pub use reply::{Reply, ReplyCode};
