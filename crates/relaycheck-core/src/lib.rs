//! # relaycheck-core
//!
//! Pre-flight validation for SMTP relays configured on devices such as
//! scanners and printers.
//!
//! This crate provides:
//! - Relay configuration model and up-front validation
//! - An outbound address guard against private and reserved ranges
//! - The validation run itself, reported as an ordered diagnostic trace
//! - A liveness report
//!
//! ## Quick Start
//!
//! ```ignore
//! use relaycheck_core::{SmtpConfig, TlsMode, validate_smtp};
//!
//! let config = SmtpConfig::new("smtp.example.com", 587)
//!     .tls(TlsMode::Negotiate)
//!     .login("scanner@example.com", "secret");
//!
//! let result = validate_smtp(&config).await;
//! for event in &result.trace {
//!     println!("{}", event.message);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
mod health;
pub mod network;
pub mod ssrf;
pub mod trace;
mod validator;

pub use config::{AuthMode, ConfigError, IMPLICIT_TLS_PORT, SmtpConfig, TlsMode};
pub use error::Failure;
pub use health::{Health, health};
pub use network::{Network, SystemNetwork};
pub use trace::{TestResult, TraceEvent, TraceKind};
pub use validator::{
    DEFAULT_STEP_TIMEOUT, Settings, StartTlsOutcome, Validator, validate_smtp,
};
