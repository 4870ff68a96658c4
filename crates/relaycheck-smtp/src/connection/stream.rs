//! Low-level SMTP stream handling.

use crate::MAX_LINE_LEN;
use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

impl SmtpStream {
    /// Wraps an established TCP connection.
    #[must_use]
    pub fn plain(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    /// Performs a TLS handshake over an established TCP connection (implicit TLS).
    ///
    /// # Errors
    ///
    /// Returns an error if the server name is invalid or the handshake fails.
    pub async fn implicit_tls(
        stream: TcpStream,
        hostname: &str,
        connector: &TlsConnector,
    ) -> Result<Self> {
        let tls_stream = connector.connect(server_name(hostname)?, stream).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads a line from the stream, without its line ending.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, the peer closed the connection, or
    /// the line exceeds [`MAX_LINE_LEN`].
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        let limit = MAX_LINE_LEN as u64;
        let read = match self {
            Self::Tcp(reader) => reader.take(limit).read_until(b'\n', &mut line).await?,
            Self::Tls(reader) => reader.take(limit).read_until(b'\n', &mut line).await?,
        };
        if read == 0 {
            return Err(Error::ConnectionClosed);
        }
        if !line.ends_with(b"\n") && read as u64 == limit {
            return Err(Error::Protocol(format!(
                "Reply line exceeds {MAX_LINE_LEN} bytes"
            )));
        }

        let line = String::from_utf8_lossy(&line).trim_end().to_string();
        tracing::debug!(recv = %line);
        Ok(line)
    }

    /// Writes data to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str, connector: &TlsConnector) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
        };

        let tls_stream = connector
            .connect(server_name(hostname)?, tcp_stream)
            .await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }

    /// Shuts the write half down so the peer sees a clean close.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Tcp(reader) => reader.get_mut().shutdown().await?,
            Self::Tls(reader) => reader.get_mut().shutdown().await?,
        }
        Ok(())
    }
}

fn server_name(hostname: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {hostname}")))
}

/// Creates a TLS connector.
///
/// With `verify` set, certificates are checked against the webpki root set.
/// Without it, any certificate is accepted; the handshake still encrypts the
/// session but proves nothing about the peer.
#[must_use]
pub fn tls_connector(verify: bool) -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if !verify {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(danger::AcceptAnyCertificate::new()));
    }

    TlsConnector::from(Arc::new(config))
}

mod danger {
    use rustls::DigitallySignedStruct;
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{
        CryptoProvider, WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature,
    };
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};

    /// Skips chain and name validation but still checks handshake signatures.
    #[derive(Debug)]
    pub(super) struct AcceptAnyCertificate {
        algorithms: WebPkiSupportedAlgorithms,
    }

    impl AcceptAnyCertificate {
        pub(super) fn new() -> Self {
            let algorithms = CryptoProvider::get_default().map_or_else(
                || rustls::crypto::aws_lc_rs::default_provider().signature_verification_algorithms,
                |provider| provider.signature_verification_algorithms,
            );
            Self { algorithms }
        }
    }

    impl ServerCertVerifier for AcceptAnyCertificate {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls12_signature(message, cert, dss, &self.algorithms)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls13_signature(message, cert, dss, &self.algorithms)
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.algorithms.supported_schemes()
        }
    }
}
