//! Reasons a validation run stops.

use crate::config::ConfigError;
use std::net::IpAddr;
use std::time::Duration;

/// A terminal failure of a validation run.
///
/// Every variant renders to exactly one trace line and one summary.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    /// The configuration was rejected before any network activity.
    #[error("invalid configuration: {}", join(.0))]
    InvalidConfig(Vec<ConfigError>),

    /// The host did not resolve.
    #[error("cannot resolve {host}: {reason}")]
    Resolution {
        /// The host as configured.
        host: String,
        /// Resolver detail.
        reason: String,
    },

    /// The host resolved into a blocked range.
    #[error("{ip} is in blocked range {range}")]
    SsrfBlocked {
        /// The offending address.
        ip: IpAddr,
        /// The range it matched.
        range: String,
    },

    /// The TCP connection could not be opened.
    #[error("cannot connect to {host}:{port}: {reason}")]
    Connect {
        /// The host as configured.
        host: String,
        /// The port.
        port: u16,
        /// Transport detail.
        reason: String,
    },

    /// A connection step did not finish in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The server rejected the credentials.
    #[error("authentication rejected: {0}")]
    AuthenticationFailed(relaycheck_smtp::Error),

    /// Authentication broke down for a reason other than rejection.
    #[error("authentication error: {0}")]
    AuthenticationError(String),

    /// Any other connection-phase problem: TLS handshake, greeting, EHLO.
    #[error("{0}")]
    Unexpected(String),
}

impl Failure {
    /// Line appended to the trace as the final error event.
    #[must_use]
    pub fn trace_message(&self) -> String {
        match self {
            Self::InvalidConfig(errors) => format!("✗ Invalid configuration: {}", join(errors)),
            Self::Resolution { host, .. } => format!("✗ Cannot resolve hostname: {host}"),
            Self::SsrfBlocked { ip, .. } => format!(
                "✗ Hostname resolves to a private/reserved IP ({ip}) - connection blocked"
            ),
            Self::Connect { host, port, .. } => format!("✗ Cannot connect to {host}:{port}"),
            Self::Timeout(_) => "✗ Connection timeout - server not responding".to_string(),
            Self::AuthenticationFailed(_) => {
                "✗ Authentication failed: Invalid username or password".to_string()
            }
            Self::AuthenticationError(detail) => format!("✗ Authentication error: {detail}"),
            Self::Unexpected(detail) => format!("✗ Connection error: {detail}"),
        }
    }

    /// One-line verdict for the result.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::InvalidConfig(_) => "Invalid configuration".to_string(),
            Self::Resolution { .. } => "DNS resolution failed".to_string(),
            Self::SsrfBlocked { .. } => "SSRF protection: target IP is not permitted".to_string(),
            Self::Connect { .. } => "Connection failed".to_string(),
            Self::Timeout(_) => "Connection timeout".to_string(),
            Self::AuthenticationFailed(_) => "Authentication failed".to_string(),
            Self::AuthenticationError(_) => "Authentication error".to_string(),
            Self::Unexpected(detail) => format!("Connection error: {detail}"),
        }
    }
}

fn join(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
