//! Connection configuration types.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default I/O timeout applied to connect, every write and every read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption unless upgraded later with STARTTLS (port 25).
    #[default]
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 25).
    StartTls,
    /// TLS from the start (port 465).
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 25,
            Self::Implicit => 465,
        }
    }
}

/// SMTP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname, optionally with an embedded `:port`.
    pub host: String,
    /// Server port; resolved from `host` or the security default when unset.
    pub port: Option<u16>,
    /// Security mode.
    pub security: Security,
    /// Name sent with HELO; derived from the local socket address when unset.
    pub local_hostname: Option<String>,
    /// Local address to bind before connecting.
    pub source_address: Option<SocketAddr>,
    /// Timeout for connect, writes and reads; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Whether AUTH may carry an initial response.
    pub initial_response: bool,
}

impl Config {
    /// Creates a new plaintext configuration with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::builder(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Resolves the host and port to connect to.
    ///
    /// Without an explicit port, a host of the form `name:port` is split.
    /// Hosts with more than one colon (IPv6 literals) are never split.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if an embedded port is not numeric.
    pub fn endpoint(&self) -> Result<(String, u16)> {
        if let Some(port) = self.port {
            return Ok((self.host.clone(), port));
        }

        if let Some((host, port)) = self.host.split_once(':')
            && !port.contains(':')
        {
            let port = port
                .parse::<u16>()
                .map_err(|_| Error::Connect(format!("nonnumeric port: {port:?}")))?;
            return Ok((host.to_string(), port));
        }

        Ok((self.host.clone(), self.security.default_port()))
    }

    /// Returns the validated I/O timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] for a zero timeout.
    pub fn io_timeout(&self) -> Result<Option<Duration>> {
        match self.timeout {
            Some(timeout) if timeout.is_zero() => {
                Err(Error::Connect("a zero timeout is not supported".into()))
            }
            timeout => Ok(timeout),
        }
    }
}

/// Formats a local address as an SMTP address literal.
#[must_use]
pub fn address_literal(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("[{v4}]"),
        IpAddr::V6(v6) => format!("[IPv6:{v6}]"),
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    local_hostname: Option<String>,
    source_address: Option<SocketAddr>,
    timeout: Option<Duration>,
    initial_response: bool,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::None,
            local_hostname: None,
            source_address: None,
            timeout: Some(DEFAULT_TIMEOUT),
            initial_response: true,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the name sent with HELO.
    #[must_use]
    pub fn local_hostname(mut self, name: impl Into<String>) -> Self {
        self.local_hostname = Some(name.into());
        self
    }

    /// Binds the local end of the connection to this address.
    #[must_use]
    pub const fn source_address(mut self, address: SocketAddr) -> Self {
        self.source_address = Some(address);
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables the I/O timeout.
    #[must_use]
    pub const fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Controls whether AUTH may carry an initial response.
    #[must_use]
    pub const fn initial_response(mut self, enabled: bool) -> Self {
        self.initial_response = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            security: self.security,
            local_hostname: self.local_hostname,
            source_address: self.source_address,
            timeout: self.timeout,
            initial_response: self.initial_response,
        }
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
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(), 25);
        assert_eq!(Security::StartTls.default_port(), 25);
        assert_eq!(Security::Implicit.default_port(), 465);
    }

    #[test]
    fn test_config_new() {
        let config = Config::new("smtp.example.com");
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, None);
        assert_eq!(config.security, Security::None);
        assert_eq!(config.timeout, Some(DEFAULT_TIMEOUT));
        assert!(config.initial_response);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("smtp.example.com")
            .port(587)
            .security(Security::StartTls)
            .local_hostname("client.example.com")
            .timeout(Duration::from_secs(10))
            .initial_response(false)
            .build();

        assert_eq!(config.port, Some(587));
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.local_hostname.as_deref(), Some("client.example.com"));
        assert_eq!(config.timeout, Some(Duration::from_secs(10)));
        assert!(!config.initial_response);
    }

    #[test]
    fn test_endpoint_explicit_port_wins() {
        let config = Config::builder("smtp.example.com:2525").port(587).build();
        assert_eq!(
            config.endpoint().unwrap(),
            ("smtp.example.com:2525".to_string(), 587)
        );
    }

    #[test]
    fn test_endpoint_embedded_port() {
        let config = Config::new("smtp.example.com:2525");
        assert_eq!(
            config.endpoint().unwrap(),
            ("smtp.example.com".to_string(), 2525)
        );
    }

    #[test]
    fn test_endpoint_nonnumeric_port() {
        let config = Config::new("smtp.example.com:smtp");
        assert!(matches!(config.endpoint(), Err(Error::Connect(_))));
    }

    #[test]
    fn test_endpoint_default_port() {
        assert_eq!(Config::new("mx.example.com").endpoint().unwrap().1, 25);

        let config = Config::builder("mx.example.com")
            .security(Security::Implicit)
            .build();
        assert_eq!(config.endpoint().unwrap().1, 465);
    }

    #[test]
    fn test_endpoint_ipv6_literal_not_split() {
        let config = Config::new("::1");
        assert_eq!(config.endpoint().unwrap(), ("::1".to_string(), 25));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config::builder("smtp.example.com")
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(config.io_timeout(), Err(Error::Connect(_))));

        let config = Config::builder("smtp.example.com").no_timeout().build();
        assert_eq!(config.io_timeout().unwrap(), None);
    }

    #[test]
    fn test_address_literal() {
        assert_eq!(
            address_literal(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))),
            "[192.0.2.1]"
        );
        assert_eq!(
            address_literal(IpAddr::V6(Ipv6Addr::LOCALHOST)),
            "[IPv6:::1]"
        );
    }
}
