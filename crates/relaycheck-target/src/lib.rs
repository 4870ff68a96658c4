//! # relaycheck-target
//!
//! A minimal SMTP server to point a relay validator at.
//!
//! It offers STARTTLS when given a certificate, accepts `AUTH PLAIN` and
//! `AUTH LOGIN` against a single credential, and discards every message it
//! receives. Nothing is stored or forwarded.
//!
//! ```ignore
//! use relaycheck_target::{Credential, Server, TargetConfig};
//!
//! let config = TargetConfig::new("127.0.0.1:2587".parse()?)
//!     .tls("cert.pem", "key.pem");
//! let server = Server::bind(config, Credential::new("printer@local.test", "changeme")).await?;
//! server.run().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod auth;
pub mod config;
mod error;
mod server;
mod session;
pub mod tls;

pub use auth::{Credential, Verify};
pub use config::{DEFAULT_IDLE_TIMEOUT, DEFAULT_PORT, TargetConfig, TlsPaths};
pub use error::{Error, Result};
pub use server::{Server, SessionCounter};
