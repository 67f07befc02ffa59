//! Stream types for SMTP connections.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use super::config::{Config, Security};
use super::transport::within;
use crate::error::{Error, Result};

/// A byte stream a session can run over.
///
/// Implemented by [`SmtpStream`] for real connections; tests provide their
/// own scripted streams.
pub trait MailStream: AsyncRead + AsyncWrite + Unpin + Sized {
    /// Performs a TLS handshake over this stream.
    fn start_tls(self, server_name: &str) -> impl Future<Output = Result<Self>> + Send;

    /// Returns true if traffic on this stream is encrypted.
    fn is_encrypted(&self) -> bool;

    /// Returns the local socket address, if there is one.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A stream that can be either plaintext or TLS.
#[derive(Debug)]
pub enum SmtpStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl MailStream for SmtpStream {
    async fn start_tls(self, server_name: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => Ok(Self::Tls(Box::new(tls_handshake(server_name, tcp).await?))),
            Self::Tls(_) => Err(Error::InvalidState("stream is already TLS".to_string())),
        }
    }

    fn is_encrypted(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Plain(tcp) => tcp.local_addr().ok(),
            Self::Tls(tls) => tls.get_ref().0.local_addr().ok(),
        }
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with the webpki root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

async fn tls_handshake(host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(host.to_string())?;
    create_tls_connector()
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Tls(e.to_string()))
}

/// Opens a connection as described by `config`.
///
/// With [`Security::Implicit`] the TLS handshake happens before this returns.
///
/// # Errors
///
/// Returns [`Error::Connect`] for a zero timeout, a nonnumeric embedded port,
/// or a failed TCP connect, and [`Error::Tls`] for a failed handshake.
pub async fn connect(config: &Config) -> Result<SmtpStream> {
    let timeout = config.io_timeout()?;
    let (host, port) = config.endpoint()?;
    debug!(%host, port, security = ?config.security, "connecting");

    let tcp = within(timeout, open_tcp(&host, port, config.source_address))
        .await
        .map_err(|e| Error::Connect(format!("{host}:{port}: {e}")))?;

    match config.security {
        Security::None | Security::StartTls => Ok(SmtpStream::Plain(tcp)),
        Security::Implicit => {
            let handshake = tls_handshake(&host, tcp);
            let tls = match timeout {
                Some(limit) => tokio::time::timeout(limit, handshake)
                    .await
                    .map_err(|_| Error::Tls("TLS handshake timed out".to_string()))??,
                None => handshake.await?,
            };
            Ok(SmtpStream::Tls(Box::new(tls)))
        }
    }
}

async fn open_tcp(host: &str, port: u16, source: Option<SocketAddr>) -> io::Result<TcpStream> {
    let Some(source) = source else {
        return TcpStream::connect((host, port)).await;
    };

    let mut last_error = None;
    for addr in lookup_host((host, port)).await? {
        if addr.is_ipv4() != source.is_ipv4() {
            continue;
        }
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.bind(source)?;
        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address of {host} matches source address {source}"),
        )
    }))
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
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[test]
    fn test_create_tls_connector() {
        let _connector = create_tls_connector();
    }

    #[tokio::test]
    async fn test_connect_rejects_zero_timeout() {
        let config = Config::builder("127.0.0.1")
            .port(1)
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(connect(&config).await, Err(Error::Connect(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_nonnumeric_port() {
        let config = Config::new("127.0.0.1:smtp");
        assert!(matches!(connect(&config).await, Err(Error::Connect(_))));
    }

    #[tokio::test]
    async fn test_connect_plain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = Config::builder("127.0.0.1").port(port).build();
        let stream = connect(&config).await.unwrap();
        assert!(!stream.is_encrypted());
        assert!(stream.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_connect_with_source_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = Config::builder("127.0.0.1")
            .port(port)
            .source_address("127.0.0.1:0".parse().unwrap())
            .build();
        let stream = connect(&config).await.unwrap();
        let (_server, peer) = listener.accept().await.unwrap();
        assert_eq!(stream.local_addr().unwrap(), peer);
    }
}
