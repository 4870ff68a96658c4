//! # relaycheck-smtp
//!
//! The SMTP wire layer shared by the relaycheck validator and its test target.
//!
//! ## Features
//!
//! - **Type-state client**: `Connected` → `Authenticated`, with STARTTLS and
//!   login outcomes returned as explicit variants instead of lost sessions
//! - **Both sides of the wire**: commands serialize for the client and parse
//!   for the server; replies parse for the client and serialize for the server
//! - **TLS**: implicit TLS (port 465) and STARTTLS over `tokio-rustls`
//! - **Authentication**: PLAIN and LOGIN, encoded and decoded in [`sasl`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use relaycheck_smtp::{Client, Login, StartTls};
//! use relaycheck_smtp::connection::{SmtpStream, tls_connector};
//!
//! let tcp = tokio::net::TcpStream::connect("203.0.113.7:587").await?;
//! let client = Client::from_stream(SmtpStream::plain(tcp)).await?;
//! let client = client.ehlo("relaycheck.local").await?;
//!
//! let client = match client.starttls("smtp.example.com", &tls_connector(true)).await {
//!     StartTls::Secured(client) | StartTls::Refused { client, .. } => client,
//!     StartTls::Lost(error) => return Err(error),
//! };
//!
//! match client.login("user@example.com", "password").await {
//!     Login::Accepted(client) => client.quit().await?,
//!     Login::Rejected { client, .. } | Login::Failed { client, .. } => client.quit().await?,
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP commands (serialize and parse)
//! - [`connection`]: Streams and the type-state client
//! - [`parser`]: Reply parser
//! - [`sasl`]: PLAIN and LOGIN payloads
//! - [`types`]: Replies, reply codes, extensions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod sasl;
pub mod types;

pub use command::{Command, CommandError};
pub use connection::{
    Authenticated, Client, Connected, Login, ServerInfo, SmtpConnection, SmtpStream, StartTls,
};
pub use error::{Error, Result};
pub use types::{AuthMechanism, Extension, Reply, ReplyClass, ReplyCode};

/// Maximum length of a command or reply line, CRLF included (RFC 5321 §4.5.3.1.4
/// allows 512; generous headroom for long AUTH payloads).
pub const MAX_LINE_LEN: usize = 4096;
