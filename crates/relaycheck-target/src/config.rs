//! Test target configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default submission port.
pub const DEFAULT_PORT: u16 = 587;

/// Sessions that stay silent this long are closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Certificate and key used for STARTTLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// PEM certificate chain.
    pub cert: PathBuf,
    /// PEM private key.
    pub key: PathBuf,
}

/// Configuration for a [`crate::Server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Name announced in the greeting and EHLO reply.
    pub hostname: String,
    /// Refuse MAIL, RCPT and DATA before authentication.
    pub auth_required: bool,
    /// TLS material; without it STARTTLS is not offered.
    pub tls: Option<TlsPaths>,
    /// Idle session timeout.
    pub idle_timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            hostname: "relaycheck-target".to_string(),
            auth_required: true,
            tls: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl TargetConfig {
    /// Creates a configuration listening on `bind`.
    #[must_use]
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            ..Self::default()
        }
    }

    /// Sets the announced hostname.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Offers STARTTLS with the given certificate and key.
    #[must_use]
    pub fn tls(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsPaths {
            cert: cert.into(),
            key: key.into(),
        });
        self
    }

    /// Allows mail transactions without authentication.
    #[must_use]
    pub const fn allow_anonymous(mut self) -> Self {
        self.auth_required = false;
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_require_auth_on_submission_port() {
        let config = TargetConfig::default();
        assert_eq!(config.bind.port(), DEFAULT_PORT);
        assert!(config.bind.ip().is_unspecified());
        assert!(config.auth_required);
        assert!(config.tls.is_none());
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    }

    #[test]
    fn builder_overrides() {
        let bind = SocketAddr::from(([127, 0, 0, 1], 0));
        let config = TargetConfig::new(bind)
            .hostname("mx.local.test")
            .tls("/tmp/cert.pem", "/tmp/key.pem")
            .allow_anonymous()
            .idle_timeout(Duration::from_secs(1));
        assert_eq!(config.bind, bind);
        assert_eq!(config.hostname, "mx.local.test");
        assert!(!config.auth_required);
        assert_eq!(config.tls.map(|paths| paths.key), Some(PathBuf::from("/tmp/key.pem")));
        assert_eq!(config.idle_timeout, Duration::from_secs(1));
    }
}
