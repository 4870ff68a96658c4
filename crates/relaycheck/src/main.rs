//! `relaycheck` - Pre-flight check for the SMTP relay a scanner or printer will use.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use relaycheck_core::{
    AuthMode, DEFAULT_STEP_TIMEOUT, Settings, SmtpConfig, TestResult, TlsMode, TraceKind, Validator,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "relaycheck")]
#[command(about = "Check that an SMTP relay accepts connections and credentials", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the connection test against a relay
    Check(CheckArgs),
    /// Print the service health report
    Health,
}

#[derive(clap::Args, Debug)]
struct CheckArgs {
    /// Relay hostname or IP address
    host: String,

    /// Relay port
    #[arg(long, default_value_t = 587, allow_negative_numbers = true)]
    port: i64,

    /// Transport security
    #[arg(long, value_enum, default_value_t = Tls::None)]
    tls: Tls,

    /// Authentication mode; anything but "none" attempts a login
    #[arg(long)]
    auth: Option<String>,

    /// Login name
    #[arg(long, default_value = "")]
    user: String,

    /// Login password
    #[arg(long, env = "RELAYCHECK_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Reply address configured on the device
    #[arg(long, default_value = "")]
    reply_address: String,

    /// Seconds allowed for each network step
    #[arg(
        long,
        default_value_t = DEFAULT_STEP_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

/// Transport security as spelled on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Tls {
    None,
    Negotiate,
    Tls,
    Ssl,
}

impl From<Tls> for TlsMode {
    fn from(tls: Tls) -> Self {
        match tls {
            Tls::None => Self::None,
            Tls::Negotiate => Self::Negotiate,
            Tls::Tls => Self::Tls,
            Tls::Ssl => Self::Ssl,
        }
    }
}

impl CheckArgs {
    fn config(&self) -> SmtpConfig {
        // A bare --user implies a login
        let auth = match &self.auth {
            Some(mode) => AuthMode::from(mode.as_str()),
            None if self.user.is_empty() => AuthMode::None,
            None => AuthMode::from("login"),
        };

        let mut config = SmtpConfig::new(&self.host, self.port)
            .tls(self.tls.into())
            .reply_address(&self.reply_address);
        config.auth_mode = auth;
        config.username.clone_from(&self.user);
        config.password.clone_from(&self.password);
        config
    }

    fn settings(&self) -> Settings {
        Settings::default().step_timeout(Duration::from_secs(self.timeout))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so stdout carries only the result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaycheck=warn,relaycheck_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Commands::Check(args) => check(&args).await,
        Commands::Health => {
            println!("{}", serde_json::to_string_pretty(&relaycheck_core::health())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn check(args: &CheckArgs) -> anyhow::Result<ExitCode> {
    let config = args.config();
    let validator = Validator::with_network(relaycheck_core::SystemNetwork, args.settings());
    tracing::debug!(?config, settings = ?validator.settings(), "Starting check");

    let result = validator.validate(&config).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render(&result, &config));
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Formats the trace for a terminal, one event per line.
fn render(result: &TestResult, config: &SmtpConfig) -> String {
    let mut out = String::new();
    for event in &result.trace {
        let tag = match event.kind {
            TraceKind::Info => "info",
            TraceKind::Success => " ok ",
            TraceKind::Warning => "warn",
            TraceKind::Error => "fail",
        };
        out.push_str(&format!(
            "{} [{tag}] {}\n",
            event.at.format("%H:%M:%S%.3f"),
            event.message
        ));
    }
    if !config.reply_address.is_empty() {
        out.push_str(&format!("Reply address: {}\n", config.reply_address));
    }
    out.push_str(&format!("Result: {}\n", result.summary_message));
    out
}
