//! `relaycheck-target` - SMTP test target that authenticates and discards all mail.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use relaycheck_target::{Credential, DEFAULT_PORT, Server, TargetConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "relaycheck-target")]
#[command(about = "SMTP test target: authenticates clients and discards all mail", long_about = None)]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(long, env = "SMTP_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Accepted username
    #[arg(long, env = "SMTP_VALID_USER", default_value = "printer@local.test")]
    user: String,

    /// Accepted password
    #[arg(
        long,
        env = "SMTP_VALID_PASSWORD",
        default_value = "changeme",
        hide_env_values = true
    )]
    password: String,

    /// PEM certificate for STARTTLS
    #[arg(long, env = "SMTP_TLS_CERT", default_value = "/app/cert.pem")]
    cert: PathBuf,

    /// PEM private key for STARTTLS
    #[arg(long, env = "SMTP_TLS_KEY", default_value = "/app/key.pem")]
    key: PathBuf,

    /// Name announced in the greeting
    #[arg(long, default_value = "relaycheck-target")]
    hostname: String,

    /// Accept mail transactions without authentication
    #[arg(long)]
    allow_anonymous: bool,

    /// Seconds a silent session is kept open
    #[arg(long, default_value_t = 300)]
    idle_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaycheck_target=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = TargetConfig::new(SocketAddr::new(args.bind, args.port))
        .hostname(args.hostname)
        .tls(args.cert, args.key)
        .idle_timeout(Duration::from_secs(args.idle_timeout));
    if args.allow_anonymous {
        config = config.allow_anonymous();
    }

    let credential = Credential::new(args.user, args.password);
    info!(user = %credential.username(), "Accepted user");

    let server = Server::bind(config, credential)
        .await
        .context("failed to start SMTP test target")?;
    if !server.offers_starttls() {
        warn!("Serving plaintext only, clients cannot test STARTTLS");
    }
    info!("No mail is ever sent or stored");

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
