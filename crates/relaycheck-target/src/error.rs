//! Startup errors for the test target.

use std::io;
use std::path::PathBuf;

/// Result type alias for test target operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while starting the test target.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Certificate file could not be read.
    #[error("Failed to load certificate from {path}: {source}")]
    CertificateLoad {
        /// The certificate path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Key file could not be read or has no usable key.
    #[error("Failed to load private key from {path}: {reason}")]
    KeyLoad {
        /// The key path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
}
