//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server returned error response.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 535).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected or malformed response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Peer closed the connection.
    #[error("Connection closed by server")]
    ConnectionClosed,
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_4xx_replies_are_transient() {
        assert!(Error::smtp_error(454, "TLS not available").is_transient());
        assert!(!Error::smtp_error(535, "Authentication credentials invalid").is_transient());
        let io = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(!io.is_transient());
    }

    #[test]
    fn display_includes_code() {
        let error = Error::smtp_error(530, "Authentication required");
        assert_eq!(error.to_string(), "SMTP error 530: Authentication required");
    }
}
