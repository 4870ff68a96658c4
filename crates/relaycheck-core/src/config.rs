//! Relay configuration supplied by the caller.

use serde::{Deserialize, Serialize};

/// Conventional implicit-TLS submission port.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Transport security requested for the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plaintext only.
    #[default]
    None,
    /// Plaintext, then STARTTLS if possible.
    Negotiate,
    /// Same as `Negotiate`; kept because devices label it either way.
    Tls,
    /// Implicit TLS from the first byte.
    Ssl,
}

impl TlsMode {
    /// Returns true if a STARTTLS upgrade should be attempted.
    #[must_use]
    pub const fn requests_starttls(self) -> bool {
        matches!(self, Self::Negotiate | Self::Tls)
    }

    /// Returns the wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Negotiate => "negotiate",
            Self::Tls => "tls",
            Self::Ssl => "ssl",
        }
    }
}

impl std::fmt::Display for TlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication requested for the relay.
///
/// Only `none` disables authentication; every other value means "log in".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthMode {
    /// No authentication.
    #[default]
    None,
    /// Attempt login; the label is kept as given for display.
    Login(String),
}

impl From<String> for AuthMode {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("none") {
            Self::None
        } else {
            Self::Login(value)
        }
    }
}

impl From<&str> for AuthMode {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<AuthMode> for String {
    fn from(mode: AuthMode) -> Self {
        match mode {
            AuthMode::None => "none".to_string(),
            AuthMode::Login(label) => label,
        }
    }
}

/// Configuration for one validation run.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    /// Relay hostname or IP literal.
    pub gateway_host: String,
    /// Relay port. Wider than `u16` so out-of-range input reaches validation.
    pub gateway_port: i64,
    /// Reply-to address configured on the device. Display only.
    #[serde(default)]
    pub reply_address: String,
    /// Transport security.
    #[serde(default)]
    pub tls_mode: TlsMode,
    /// Authentication mode.
    #[serde(default)]
    pub auth_mode: AuthMode,
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Login password.
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("gateway_host", &self.gateway_host)
            .field("gateway_port", &self.gateway_port)
            .field("reply_address", &self.reply_address)
            .field("tls_mode", &self.tls_mode)
            .field("auth_mode", &self.auth_mode)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SmtpConfig {
    /// Creates a plaintext, unauthenticated configuration.
    #[must_use]
    pub fn new(host: impl Into<String>, port: i64) -> Self {
        Self {
            gateway_host: host.into(),
            gateway_port: port,
            reply_address: String::new(),
            tls_mode: TlsMode::None,
            auth_mode: AuthMode::None,
            username: String::new(),
            password: String::new(),
        }
    }

    /// Sets the transport security.
    #[must_use]
    pub const fn tls(mut self, mode: TlsMode) -> Self {
        self.tls_mode = mode;
        self
    }

    /// Requests a login with the given credentials.
    #[must_use]
    pub fn login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_mode = AuthMode::Login("login".to_string());
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the reply address shown alongside the result.
    #[must_use]
    pub fn reply_address(mut self, address: impl Into<String>) -> Self {
        self.reply_address = address.into();
        self
    }

    /// Returns the host as used on the wire.
    ///
    /// Surrounding whitespace is trimmed and a bracketed IPv6 literal
    /// (`[2001:db8::7]`) loses its brackets, so the same text serves for
    /// resolution and as the TLS server name.
    #[must_use]
    pub fn host(&self) -> &str {
        let host = self.gateway_host.trim();
        host.strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .map_or(host, str::trim)
    }

    /// Returns the port if it is in range.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        u16::try_from(self.gateway_port).ok().filter(|port| *port != 0)
    }

    /// Returns true if the run should attempt a login.
    #[must_use]
    pub fn should_authenticate(&self) -> bool {
        self.auth_mode != AuthMode::None && !self.username.is_empty()
    }

    /// Returns true if the run should use implicit TLS.
    #[must_use]
    pub fn uses_implicit_tls(&self) -> bool {
        self.tls_mode == TlsMode::Ssl || self.port() == Some(IMPLICIT_TLS_PORT)
    }

    /// Checks the configuration before any network activity.
    ///
    /// # Errors
    ///
    /// Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.host().is_empty() {
            errors.push(ConfigError::EmptyHost);
        }
        if self.port().is_none() {
            errors.push(ConfigError::InvalidPort(self.gateway_port));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A configuration problem found before the run starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Gateway host is empty.
    #[error("Gateway host is required")]
    EmptyHost,
    /// Gateway port is outside 1-65535.
    #[error("Port must be between 1 and 65535 (got {0})")]
    InvalidPort(i64),
}

impl ConfigError {
    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyHost => "gatewayHost",
            Self::InvalidPort(_) => "gatewayPort",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn port_range_is_inclusive() {
        assert!(SmtpConfig::new("relay.example.com", 1).validate().is_ok());
        assert!(SmtpConfig::new("relay.example.com", 65_535).validate().is_ok());
        assert_eq!(
            SmtpConfig::new("relay.example.com", 0).validate(),
            Err(vec![ConfigError::InvalidPort(0)])
        );
        assert_eq!(
            SmtpConfig::new("relay.example.com", 65_536).validate(),
            Err(vec![ConfigError::InvalidPort(65_536)])
        );
        assert_eq!(
            SmtpConfig::new("relay.example.com", -25).validate(),
            Err(vec![ConfigError::InvalidPort(-25)])
        );
    }

    #[test]
    fn reports_all_errors() {
        let errors = SmtpConfig::new("   ", 70_000).validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field(), "gatewayHost");
        assert_eq!(errors[1].field(), "gatewayPort");
        assert_eq!(
            errors[1].to_string(),
            "Port must be between 1 and 65535 (got 70000)"
        );
    }

    #[test]
    fn host_drops_ipv6_brackets() {
        assert_eq!(SmtpConfig::new(" [2001:db8::7] ", 587).host(), "2001:db8::7");
        assert_eq!(SmtpConfig::new("relay.example.com ", 587).host(), "relay.example.com");
        // Unbalanced brackets are left for resolution to reject
        assert_eq!(SmtpConfig::new("[::1", 587).host(), "[::1");
        assert_eq!(
            SmtpConfig::new("[ ]", 587).validate(),
            Err(vec![ConfigError::EmptyHost])
        );
    }

    #[test]
    fn authentication_needs_mode_and_username() {
        let config = SmtpConfig::new("relay.example.com", 587);
        assert!(!config.should_authenticate());
        assert!(config.clone().login("printer", "secret").should_authenticate());
        assert!(!config.clone().login("", "secret").should_authenticate());

        let mut custom = config.login("printer", "secret");
        custom.auth_mode = AuthMode::from("NONE");
        assert!(!custom.should_authenticate());
    }

    #[test]
    fn implicit_tls_by_mode_or_port() {
        assert!(SmtpConfig::new("relay", 465).uses_implicit_tls());
        assert!(SmtpConfig::new("relay", 2465).tls(TlsMode::Ssl).uses_implicit_tls());
        assert!(!SmtpConfig::new("relay", 587).tls(TlsMode::Negotiate).uses_implicit_tls());
        assert!(TlsMode::Tls.requests_starttls());
        assert!(!TlsMode::Ssl.requests_starttls());
    }

    #[test]
    fn deserializes_wire_names() {
        let json = r#"{
            "gatewayHost": "test-target",
            "gatewayPort": 587,
            "replyAddress": "scanner@local.test",
            "tlsMode": "negotiate",
            "authMode": "login",
            "username": "printer@local.test",
            "password": "changeme"
        }"#;
        let config: SmtpConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.gateway_host, "test-target");
        assert_eq!(config.port(), Some(587));
        assert_eq!(config.tls_mode, TlsMode::Negotiate);
        assert_eq!(config.auth_mode, AuthMode::Login("login".to_string()));
        assert!(config.should_authenticate());
    }

    #[test]
    fn any_auth_label_other_than_none_means_login() {
        let config: SmtpConfig = serde_json::from_str(
            r#"{"gatewayHost":"relay","gatewayPort":25,"authMode":"plain","username":"u"}"#,
        )
        .unwrap();
        assert_eq!(config.auth_mode, AuthMode::Login("plain".to_string()));
        assert_eq!(config.tls_mode, TlsMode::None);
    }

    #[test]
    fn unknown_tls_mode_is_rejected() {
        let result: Result<SmtpConfig, _> = serde_json::from_str(
            r#"{"gatewayHost":"relay","gatewayPort":25,"tlsMode":"starttls"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn password_never_leaks() {
        let config = SmtpConfig::new("relay", 587).login("printer", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
        assert!(!serde_json::to_string(&config).unwrap().contains("hunter2"));
    }
}
