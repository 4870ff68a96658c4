//! TLS material for STARTTLS.

use crate::error::{Error, Result};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Builds an acceptor from a PEM certificate chain and private key.
///
/// # Errors
///
/// Returns an error if either file is unreadable or the pair is rejected.
pub fn load_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor> {
    let certs = load_certs(cert)?;
    let key = load_key(key)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Loads TLS material if both files exist.
///
/// Missing files mean plaintext only; unusable files are logged and also
/// mean plaintext only.
#[must_use]
pub fn optional_acceptor(cert: &Path, key: &Path) -> Option<TlsAcceptor> {
    if !cert.exists() || !key.exists() {
        tracing::info!("No TLS certificate found, running plain SMTP only");
        return None;
    }

    match load_acceptor(cert, key) {
        Ok(acceptor) => {
            tracing::info!(cert = %cert.display(), "TLS certificate loaded, STARTTLS is available");
            Some(acceptor)
        }
        Err(error) => {
            tracing::warn!(%error, "Could not load TLS certificate, STARTTLS disabled");
            None
        }
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|source| Error::CertificateLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|source| Error::CertificateLoad {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(Error::CertificateLoad {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "no certificates in file"),
        });
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let key_error = |reason: String| Error::KeyLoad {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| key_error(e.to_string()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| key_error(e.to_string()))?
        .ok_or_else(|| key_error("expected a PKCS#1, PKCS#8 or SEC1 key".to_string()))
}
