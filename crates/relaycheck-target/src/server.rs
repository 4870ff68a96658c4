//! Listener and per-connection tasks.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::auth::Verify;
use crate::config::TargetConfig;
use crate::error::Result;
use crate::session;
use crate::tls;

/// Pause after a failed accept, so a persistent error such as fd
/// exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// State shared by every session.
pub(crate) struct Shared {
    pub(crate) config: TargetConfig,
    pub(crate) verifier: Box<dyn Verify>,
    pub(crate) acceptor: Option<TlsAcceptor>,
}

/// Number of sessions currently being served.
#[derive(Debug, Clone, Default)]
pub struct SessionCounter(Arc<AtomicUsize>);

impl SessionCounter {
    /// Returns the number of live sessions.
    #[must_use]
    pub fn active(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> SessionGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        SessionGuard(Arc::clone(&self.0))
    }
}

/// Decrements the counter when a session task ends, however it ends.
struct SessionGuard(Arc<AtomicUsize>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// SMTP test target.
pub struct Server {
    listener: TcpListener,
    shared: Arc<Shared>,
    sessions: SessionCounter,
}

impl Server {
    /// Binds the listener and loads TLS material if configured.
    ///
    /// Unusable TLS material is logged and STARTTLS is then not offered.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(config: TargetConfig, verifier: impl Verify) -> Result<Self> {
        let acceptor = config
            .tls
            .as_ref()
            .and_then(|paths| tls::optional_acceptor(&paths.cert, &paths.key));
        let listener = TcpListener::bind(config.bind).await?;

        tracing::info!(
            addr = %listener.local_addr()?,
            starttls = acceptor.is_some(),
            auth_required = config.auth_required,
            "SMTP test target listening"
        );

        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                config,
                verifier: Box::new(verifier),
                acceptor,
            }),
            sessions: SessionCounter::default(),
        })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns a handle on the live-session count.
    #[must_use]
    pub fn sessions(&self) -> SessionCounter {
        self.sessions.clone()
    }

    /// Returns true if STARTTLS is offered.
    #[must_use]
    pub fn offers_starttls(&self) -> bool {
        self.shared.acceptor.is_some()
    }

    /// Accepts connections until the task is dropped.
    ///
    /// # Errors
    ///
    /// Never returns under normal operation; accept errors are logged and
    /// the loop continues.
    pub async fn run(self) -> Result<()> {
        loop {
            let (tcp, peer) = accept_next(|| self.listener.accept()).await;

            let guard = self.sessions.enter();
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                let _guard = guard;
                tracing::info!(%peer, "Session opened");
                match session::serve(tcp, peer, &shared).await {
                    Ok(()) => tracing::info!(%peer, "Session closed"),
                    Err(error) => tracing::debug!(%peer, %error, "Session ended with error"),
                }
            });
        }
    }
}

/// Retries `accept` until it succeeds, pausing after each failure.
async fn accept_next<T, F, Fut>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(error) => {
                tracing::warn!(%error, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}
