//! Pre-flight validation of an SMTP relay.
//!
//! A run walks a fixed sequence of steps: configuration check, resolution,
//! address guard, connect (implicit TLS, or plaintext with optional
//! STARTTLS), authentication and QUIT. Each step reports into the trace and
//! either hands its product to the next step or stops the run with a
//! [`Failure`].

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use relaycheck_smtp::connection::tls_connector;
use relaycheck_smtp::{Client, Connected, Login, SmtpStream, StartTls};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::config::{ConfigError, SmtpConfig};
use crate::error::Failure;
use crate::network::{Network, SystemNetwork};
use crate::ssrf;
use crate::trace::{TestResult, Trace};

/// Default bound on each network step.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for a [`Validator`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bound on resolution, connect, STARTTLS, authentication and QUIT.
    pub step_timeout: Duration,
    /// Name sent with EHLO/HELO.
    pub client_hostname: String,
    /// Verify the certificate offered after STARTTLS.
    pub verify_starttls: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            step_timeout: DEFAULT_STEP_TIMEOUT,
            client_hostname: "localhost".to_string(),
            verify_starttls: false,
        }
    }
}

impl Settings {
    /// Sets the per-step timeout.
    #[must_use]
    pub const fn step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Sets the EHLO name.
    #[must_use]
    pub fn client_hostname(mut self, name: impl Into<String>) -> Self {
        self.client_hostname = name.into();
        self
    }

    /// Turns certificate verification after STARTTLS on or off.
    #[must_use]
    pub const fn verify_starttls(mut self, verify: bool) -> Self {
        self.verify_starttls = verify;
        self
    }
}

/// How a requested STARTTLS upgrade ended.
#[derive(Debug)]
pub enum StartTlsOutcome {
    /// The session is encrypted.
    Secured,
    /// The run continues in plaintext.
    Downgraded {
        /// Why the upgrade did not happen.
        reason: String,
        /// True if the first session was lost and a new one opened.
        reconnected: bool,
    },
}

/// Runs validations against SMTP relays.
///
/// A validator holds no per-run state; share it behind an `Arc` to run
/// checks concurrently.
pub struct Validator<N = SystemNetwork> {
    network: N,
    settings: Settings,
    implicit_tls: TlsConnector,
    starttls: TlsConnector,
}

impl<N: std::fmt::Debug> std::fmt::Debug for Validator<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("network", &self.network)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Validator<SystemNetwork> {
    /// Creates a validator with default settings and the system network.
    #[must_use]
    pub fn new() -> Self {
        Self::with_network(SystemNetwork, Settings::default())
    }
}

impl Default for Validator<SystemNetwork> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Network> Validator<N> {
    /// Creates a validator over a custom network.
    #[must_use]
    pub fn with_network(network: N, settings: Settings) -> Self {
        let starttls = tls_connector(settings.verify_starttls);
        Self {
            network,
            settings,
            implicit_tls: tls_connector(true),
            starttls,
        }
    }

    /// Returns the settings in use.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validates `config` and reports every step.
    ///
    /// Never fails: problems are reported in the returned [`TestResult`].
    pub async fn validate(&self, config: &SmtpConfig) -> TestResult {
        let mut trace = Trace::default();
        match self.run(config, &mut trace).await {
            Ok(()) => {
                tracing::info!(host = %config.host(), "SMTP connection test passed");
                trace.success("✓ ALL TESTS PASSED! SMTP configuration is valid and working.");
                trace.finish(true, "SMTP connection test successful")
            }
            Err(failure) => {
                tracing::warn!(host = %config.host(), error = %failure, "SMTP connection test failed");
                trace.error(failure.trace_message());
                trace.finish(false, failure.summary())
            }
        }
    }

    async fn run(&self, config: &SmtpConfig, trace: &mut Trace) -> Result<(), Failure> {
        config.validate().map_err(|errors| {
            let fields: Vec<_> = errors.iter().map(ConfigError::field).collect();
            tracing::debug!(?fields, "Configuration rejected");
            Failure::InvalidConfig(errors)
        })?;
        let host = config.host();
        let port = config
            .port()
            .ok_or_else(|| Failure::Unexpected(format!("invalid port {}", config.gateway_port)))?;

        tracing::info!(%host, port, tls_mode = %config.tls_mode, "Testing SMTP connection");
        trace.info(format!(
            "Testing connection to {host}:{port} (TLS mode: {})...",
            config.tls_mode
        ));

        let addrs = self.resolve(host).await?;
        if let Some(first) = addrs.first() {
            trace.success(format!("✓ DNS resolution successful: {host} -> {first}"));
        }
        let ip = admit(host, &addrs)?;

        trace.info(format!("Attempting connection to port {port}..."));
        let addr = SocketAddr::new(ip, port);
        let client = if config.uses_implicit_tls() {
            let client = self.open_implicit(host, addr).await?;
            trace.success(format!("✓ Connected using implicit TLS (port {port})"));
            client
        } else {
            let client = self.open_plain(host, addr).await?;
            trace.success("✓ Connected to SMTP server");
            if config.tls_mode.requests_starttls() {
                self.negotiate(client, host, addr, trace).await?
            } else {
                client
            }
        };

        self.authenticate(client, config, trace).await
    }

    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, Failure> {
        let failed = |reason: String| Failure::Resolution {
            host: host.to_string(),
            reason,
        };
        match timeout(self.settings.step_timeout, self.network.resolve(host)).await {
            Ok(Ok(addrs)) if !addrs.is_empty() => Ok(addrs),
            Ok(Ok(_)) => Err(failed("no addresses".to_string())),
            Ok(Err(error)) => Err(failed(error.to_string())),
            Err(_) => Err(failed(format!(
                "lookup timed out after {:?}",
                self.settings.step_timeout
            ))),
        }
    }

    async fn open_plain(&self, host: &str, addr: SocketAddr) -> Result<Client<Connected>, Failure> {
        self.bounded(async {
            let tcp = self.tcp(host, addr).await?;
            greet(SmtpStream::plain(tcp), &self.settings.client_hostname).await
        })
        .await
    }

    async fn open_implicit(
        &self,
        host: &str,
        addr: SocketAddr,
    ) -> Result<Client<Connected>, Failure> {
        self.bounded(async {
            let tcp = self.tcp(host, addr).await?;
            let stream = SmtpStream::implicit_tls(tcp, host, &self.implicit_tls)
                .await
                .map_err(|e| Failure::Unexpected(e.to_string()))?;
            greet(stream, &self.settings.client_hostname).await
        })
        .await
    }

    async fn tcp(&self, host: &str, addr: SocketAddr) -> Result<tokio::net::TcpStream, Failure> {
        self.network
            .connect(addr)
            .await
            .map_err(|e| Failure::Connect {
                host: host.to_string(),
                port: addr.port(),
                reason: e.to_string(),
            })
    }

    /// Attempts STARTTLS; any failure downgrades to plaintext.
    async fn negotiate(
        &self,
        client: Client<Connected>,
        host: &str,
        addr: SocketAddr,
        trace: &mut Trace,
    ) -> Result<Client<Connected>, Failure> {
        let attempt = timeout(
            self.settings.step_timeout,
            client.starttls(host, &self.starttls),
        )
        .await;

        let (client, outcome) = match attempt {
            Ok(StartTls::Secured(client)) => (client, StartTlsOutcome::Secured),
            Ok(StartTls::Refused { client, reason }) => (
                client,
                StartTlsOutcome::Downgraded {
                    reason: reason.to_string(),
                    reconnected: false,
                },
            ),
            Ok(StartTls::Lost(error)) => {
                let client = self.reopen(host, addr, &error.to_string(), trace).await?;
                (
                    client,
                    StartTlsOutcome::Downgraded {
                        reason: error.to_string(),
                        reconnected: true,
                    },
                )
            }
            Err(_) => {
                let reason = format!("no response within {:?}", self.settings.step_timeout);
                let client = self.reopen(host, addr, &reason, trace).await?;
                (
                    client,
                    StartTlsOutcome::Downgraded {
                        reason,
                        reconnected: true,
                    },
                )
            }
        };

        match outcome {
            StartTlsOutcome::Secured => trace.success("✓ STARTTLS negotiation successful"),
            StartTlsOutcome::Downgraded {
                reason,
                reconnected: false,
            } => {
                tracing::warn!(%host, %reason, "STARTTLS failed, continuing in plaintext");
                trace.warning(format!("⚠ STARTTLS failed: {reason}"));
            }
            StartTlsOutcome::Downgraded {
                reconnected: true, ..
            } => trace.info("Reconnected without TLS"),
        }
        Ok(client)
    }

    async fn reopen(
        &self,
        host: &str,
        addr: SocketAddr,
        reason: &str,
        trace: &mut Trace,
    ) -> Result<Client<Connected>, Failure> {
        tracing::warn!(%host, %reason, "STARTTLS lost the session, reconnecting in plaintext");
        trace.warning(format!("⚠ STARTTLS failed: {reason}"));
        self.open_plain(host, addr).await
    }

    async fn authenticate(
        &self,
        client: Client<Connected>,
        config: &SmtpConfig,
        trace: &mut Trace,
    ) -> Result<(), Failure> {
        if !config.should_authenticate() {
            trace.warning("⚠ No authentication configured - skipping auth test");
            self.release(client).await;
            return Ok(());
        }

        trace.info(format!("Attempting authentication as {}...", config.username));
        let login = timeout(
            self.settings.step_timeout,
            client.login(&config.username, &config.password),
        )
        .await;

        match login {
            Ok(Login::Accepted(client)) => {
                trace.success("✓ Authentication successful!");
                trace.success("✓ SMTP account is ready to send emails");
                self.release(client).await;
                Ok(())
            }
            Ok(Login::Rejected { client, error }) => {
                tracing::warn!(
                    username = %config.username,
                    transient = error.is_transient(),
                    %error,
                    "Authentication rejected"
                );
                self.release(client).await;
                Err(Failure::AuthenticationFailed(error))
            }
            Ok(Login::Failed { client, error }) => {
                self.release(client).await;
                Err(Failure::AuthenticationError(error.to_string()))
            }
            // The session was dropped with the timed-out future
            Err(_) => Err(Failure::AuthenticationError(format!(
                "no response within {:?}",
                self.settings.step_timeout
            ))),
        }
    }

    /// Sends QUIT; errors are logged and dropped.
    async fn release<S>(&self, client: Client<S>) {
        match timeout(self.settings.step_timeout, client.quit()).await {
            Ok(Ok(())) => tracing::debug!("Session closed"),
            Ok(Err(error)) => tracing::debug!(%error, "QUIT failed"),
            Err(_) => tracing::debug!("QUIT timed out"),
        }
    }

    async fn bounded<T>(
        &self,
        step: impl Future<Output = Result<T, Failure>>,
    ) -> Result<T, Failure> {
        timeout(self.settings.step_timeout, step)
            .await
            .map_err(|_| Failure::Timeout(self.settings.step_timeout))?
    }
}

/// Reads the greeting and introduces ourselves.
async fn greet(stream: SmtpStream, client_hostname: &str) -> Result<Client<Connected>, Failure> {
    let client = Client::from_stream(stream)
        .await
        .map_err(|e| Failure::Unexpected(e.to_string()))?;
    client
        .ehlo(client_hostname)
        .await
        .map_err(|e| Failure::Unexpected(e.to_string()))
}

/// Checks every resolved address and picks the first.
fn admit(host: &str, addrs: &[IpAddr]) -> Result<IpAddr, Failure> {
    for ip in addrs {
        if let Some(range) = ssrf::blocked_range(*ip) {
            tracing::warn!(%host, %ip, %range, "SSRF attempt blocked");
            return Err(Failure::SsrfBlocked {
                ip: *ip,
                range: range.to_string(),
            });
        }
    }
    addrs.first().copied().ok_or_else(|| Failure::Resolution {
        host: host.to_string(),
        reason: "no addresses".to_string(),
    })
}

/// Validates `config` with default settings over the system network.
pub async fn validate_smtp(config: &SmtpConfig) -> TestResult {
    Validator::new().validate(config).await
}
