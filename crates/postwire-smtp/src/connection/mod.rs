//! SMTP connection management.
//!
//! Layers, bottom up:
//! - [`SmtpStream`]: plaintext or TLS socket, behind the [`MailStream`] seam
//! - [`Transport`]: timed writes and length-capped line reads
//! - [`Channel`]: command serialization and reply assembly

mod channel;
mod config;
mod stream;
mod transport;

pub use channel::Channel;
pub use config::{Config, ConfigBuilder, DEFAULT_TIMEOUT, Security, address_literal};
pub use stream::{MailStream, SmtpStream, connect, create_tls_connector};
pub use transport::Transport;

#[cfg(test)]
mod test_support {
    use super::MailStream;
    use crate::error::Result;

    impl MailStream for tokio_test::io::Mock {
        async fn start_tls(self, _server_name: &str) -> Result<Self> {
            Ok(self)
        }

        fn is_encrypted(&self) -> bool {
            false
        }
    }
}
