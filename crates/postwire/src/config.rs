//! Client configuration file.
//!
//! ```toml
//! [server]
//! host = "smtp.example.com"
//! security = "starttls"
//!
//! [auth]
//! username = "ann@example.com"
//!
//! [message]
//! from = "Ann <ann@example.com>"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `auth.password`.
pub const PASSWORD_ENV: &str = "POSTWIRE_PASSWORD";

/// Security/encryption mode for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Plaintext for the whole session.
    None,
    /// STARTTLS upgrade after plaintext connect.
    #[default]
    StartTls,
    /// Implicit TLS (connect directly with TLS).
    Tls,
}

impl From<SecurityMode> for postwire_smtp::Security {
    fn from(mode: SecurityMode) -> Self {
        match mode {
            SecurityMode::None => Self::None,
            SecurityMode::StartTls => Self::StartTls,
            SecurityMode::Tls => Self::Implicit,
        }
    }
}

/// SMTP server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Server hostname, optionally with `:port`.
    pub host: String,
    /// Server port (default: 25, or 465 for implicit TLS).
    pub port: Option<u16>,
    /// Security mode.
    pub security: SecurityMode,
    /// Socket timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Name announced in HELO.
    pub local_hostname: Option<String>,
    /// Local address to bind before connecting.
    pub source_address: Option<SocketAddr>,
}

/// Credentials. Authentication is skipped without a username.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Message defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessageConfig {
    /// Default sender mailbox.
    pub from: Option<String>,
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Server settings.
    pub server: ServerConfig,
    /// Credentials.
    pub auth: AuthConfig,
    /// Message defaults.
    pub message: MessageConfig,
}

impl ClientConfig {
    /// Returns the default configuration path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("postwire")
            .join("config.toml")
    }

    /// Loads and validates a configuration file, then applies the
    /// password override from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::parse(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.auth.password = Some(password);
        }
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host must be set");
        }
        if self.server.timeout_secs == Some(0) {
            bail!("server.timeout_secs must be positive");
        }
        if self.auth.password.is_some() && self.auth.username.is_none() {
            bail!("auth.password is set without auth.username");
        }
        Ok(())
    }

    /// Builds the session configuration.
    pub fn session_config(&self) -> postwire_smtp::Config {
        let server = &self.server;
        let mut builder =
            postwire_smtp::Config::builder(server.host.trim()).security(server.security.into());
        if let Some(port) = server.port {
            builder = builder.port(port);
        }
        if let Some(secs) = server.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(name) = &server.local_hostname {
            builder = builder.local_hostname(name.clone());
        }
        if let Some(address) = server.source_address {
            builder = builder.source_address(address);
        }
        builder.build()
    }

    /// Returns the credentials when a username is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.auth.username.as_deref().map(|user| {
            (user, self.auth.password.as_deref().unwrap_or_default())
        })
    }

    /// Renders a commented sample configuration.
    pub fn sample() -> String {
        concat!(
            "# postwire configuration\n",
            "\n",
            "[server]\n",
            "host = \"smtp.example.com\"\n",
            "# port = 587\n",
            "# none, starttls or tls\n",
            "security = \"starttls\"\n",
            "timeout_secs = 60\n",
            "# local_hostname = \"client.example.com\"\n",
            "# source_address = \"192.0.2.10:0\"\n",
            "\n",
            "[auth]\n",
            "username = \"ann@example.com\"\n",
            "# Prefer the POSTWIRE_PASSWORD environment variable.\n",
            "# password = \"secret\"\n",
            "\n",
            "[message]\n",
            "from = \"Ann <ann@example.com>\"\n",
        )
        .to_string()
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

    #[test]
    fn test_sample_parses() {
        let config = ClientConfig::parse(&ClientConfig::sample()).unwrap();
        assert_eq!(config.server.host, "smtp.example.com");
        assert_eq!(config.server.security, SecurityMode::StartTls);
        assert_eq!(config.server.timeout_secs, Some(60));
        assert_eq!(config.credentials(), Some(("ann@example.com", "")));
        assert_eq!(config.message.from.as_deref(), Some("Ann <ann@example.com>"));
    }

    #[test]
    fn test_session_config_mapping() {
        let config = ClientConfig::parse(
            "[server]\nhost = \"mx.example.com\"\nport = 2525\nsecurity = \"tls\"\n\
             timeout_secs = 5\nlocal_hostname = \"me.example.com\"\n\
             source_address = \"127.0.0.1:0\"\n",
        )
        .unwrap();
        let session = config.session_config();

        assert_eq!(session.host, "mx.example.com");
        assert_eq!(session.port, Some(2525));
        assert_eq!(session.security, postwire_smtp::Security::Implicit);
        assert_eq!(session.timeout, Some(Duration::from_secs(5)));
        assert_eq!(session.local_hostname.as_deref(), Some("me.example.com"));
        assert_eq!(session.source_address, Some("127.0.0.1:0".parse().unwrap()));
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(ClientConfig::parse("").is_err());
        assert!(ClientConfig::parse("[server]\nhost = \"h\"\ntimeout_secs = 0\n").is_err());
        assert!(ClientConfig::parse("[server]\nhost = \"h\"\nsecurity = \"ssl\"\n").is_err());
        assert!(ClientConfig::parse("[server]\nhost = \"h\"\nbogus = 1\n").is_err());
        assert!(ClientConfig::parse("[server]\nhost = \"h\"\n[auth]\npassword = \"p\"\n").is_err());
    }

    #[test]
    fn test_password_redacted() {
        let auth = AuthConfig {
            username: Some("ann".to_string()),
            password: Some("hunter2".to_string()),
        };
        let debug = format!("{auth:?}");
        assert!(debug.contains("ann"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_default_path() {
        let path = ClientConfig::default_path();
        assert!(path.ends_with("postwire/config.toml"));
    }
}
