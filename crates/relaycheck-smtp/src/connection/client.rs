//! Type-state SMTP client.
//!
//! Operations that can fail without destroying the session (a refused
//! STARTTLS, rejected credentials) hand the client back inside their outcome
//! so the caller can still continue or QUIT cleanly.

use super::{ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{ReplyLine, parse_reply};
use crate::sasl;
use crate::types::{AuthMechanism, Extension, Reply, ReplyCode};
use std::collections::HashSet;
use std::marker::PhantomData;
use tokio_rustls::TlsConnector;

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    helo_name: String,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;

    /// Returns true if the session runs over TLS.
    fn is_tls(&self) -> bool;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }
}

/// Outcome of a STARTTLS attempt.
#[derive(Debug)]
pub enum StartTls {
    /// The session is now encrypted and EHLO was re-issued.
    Secured(Client<Connected>),
    /// The server does not offer STARTTLS or answered it negatively; the
    /// plaintext session is intact.
    Refused {
        /// The unchanged plaintext client.
        client: Client<Connected>,
        /// Why the upgrade did not happen.
        reason: Error,
    },
    /// The handshake or the post-upgrade EHLO failed; the session is gone.
    Lost(Error),
}

/// Outcome of an authentication attempt.
#[derive(Debug)]
pub enum Login {
    /// Credentials accepted.
    Accepted(Client<Authenticated>),
    /// The server answered the exchange with a negative reply.
    Rejected {
        /// The still-connected client.
        client: Client<Connected>,
        /// The negative reply.
        error: Error,
    },
    /// The exchange broke down for another reason (no usable mechanism,
    /// protocol violation, I/O).
    Failed {
        /// The client; it may be unusable after an I/O error.
        client: Client<Connected>,
        /// What went wrong.
        error: Error,
    },
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = Self::read_reply(&mut stream).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::smtp_error(
                greeting.code.as_u16(),
                greeting.message_text(),
            ));
        }

        // Extract hostname from greeting (first word after code)
        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            helo_name: String::new(),
            _state: PhantomData,
        })
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// Servers that reject EHLO with a permanent error get a plain HELO
    /// instead, leaving the extension set empty.
    ///
    /// # Errors
    ///
    /// Returns an error if both greetings fail.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        self.helo_name = client_hostname.to_string();
        let reply = self
            .send_command(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;

        if reply.is_success() {
            self.server_info.extensions = parse_extensions(&reply);
            return Ok(self);
        }
        if !reply.is_permanent_error() {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        tracing::debug!(code = %reply.code, "EHLO refused, falling back to HELO");
        let reply = self
            .send_command(Command::Helo {
                hostname: client_hostname.to_string(),
            })
            .await?;
        if !reply.is_success() {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }
        self.server_info.extensions.clear();
        Ok(self)
    }

    /// Upgrades the connection to TLS using STARTTLS.
    ///
    /// `hostname` is the name presented for SNI and certificate checks.
    pub async fn starttls(mut self, hostname: &str, connector: &TlsConnector) -> StartTls {
        if !self.server_info.supports_starttls() {
            return StartTls::Refused {
                client: self,
                reason: Error::NotSupported("STARTTLS".into()),
            };
        }

        let reply = match self.send_command(Command::StartTls).await {
            Ok(reply) => reply,
            Err(error) => return StartTls::Lost(error),
        };
        if reply.code != ReplyCode::SERVICE_READY {
            return StartTls::Refused {
                client: self,
                reason: Error::smtp_error(reply.code.as_u16(), reply.message_text()),
            };
        }

        self.stream = match self.stream.upgrade_to_tls(hostname, connector).await {
            Ok(stream) => stream,
            Err(error) => return StartTls::Lost(error),
        };

        // RFC 3207: forget everything learned before the upgrade
        self.server_info.extensions.clear();
        let helo_name = self.helo_name.clone();
        match self.ehlo(&helo_name).await {
            Ok(client) => StartTls::Secured(client),
            Err(error) => StartTls::Lost(error),
        }
    }

    /// Authenticates with the best mechanism the server advertises.
    ///
    /// PLAIN is preferred over LOGIN. A server that advertises neither gets
    /// [`Login::Failed`] without any exchange on the wire.
    pub async fn login(self, username: &str, password: &str) -> Login {
        let mechanisms = self.server_info.auth_mechanisms();
        if mechanisms.contains(&AuthMechanism::Plain) {
            self.auth_plain(username, password).await
        } else if mechanisms.contains(&AuthMechanism::Login) {
            self.auth_login(username, password).await
        } else if mechanisms.is_empty() {
            Login::Failed {
                client: self,
                error: Error::NotSupported("AUTH".into()),
            }
        } else {
            Login::Failed {
                client: self,
                error: Error::NotSupported("a PLAIN or LOGIN authentication mechanism".into()),
            }
        }
    }

    /// Authenticates using PLAIN mechanism.
    pub async fn auth_plain(mut self, username: &str, password: &str) -> Login {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(sasl::plain_response(username, password)),
        };
        let result = self.send_command(cmd).await;
        self.finish_auth(result)
    }

    /// Authenticates using LOGIN mechanism.
    pub async fn auth_login(mut self, username: &str, password: &str) -> Login {
        let result = self.login_exchange(username, password).await;
        self.finish_auth(result)
    }

    async fn login_exchange(&mut self, username: &str, password: &str) -> Result<Reply> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        let reply = self.send_command(cmd).await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Ok(reply);
        }

        let reply = self
            .send_line(sasl::login_response(username).as_bytes())
            .await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Ok(reply);
        }

        self.send_line(sasl::login_response(password).as_bytes())
            .await
    }

    fn finish_auth(self, result: Result<Reply>) -> Login {
        match result {
            Ok(reply) if reply.code == ReplyCode::AUTH_SUCCESS => Login::Accepted(Client {
                stream: self.stream,
                server_info: self.server_info,
                helo_name: self.helo_name,
                _state: PhantomData,
            }),
            Ok(reply) if reply.is_transient_error() || reply.is_permanent_error() => {
                Login::Rejected {
                    client: self,
                    error: Error::smtp_error(reply.code.as_u16(), reply.message_text()),
                }
            }
            Ok(reply) => Login::Failed {
                client: self,
                error: Error::Protocol(format!(
                    "Unexpected reply to authentication: {} {}",
                    reply.code,
                    reply.message_text()
                )),
            },
            Err(error) => Login::Failed {
                client: self,
                error,
            },
        }
    }
}

// Common implementation for all states
impl<S> Client<S> {
    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        let data = cmd.serialize();
        match &cmd {
            // Never log credentials
            Command::Auth { mechanism, .. } => tracing::debug!(send = %format!("AUTH {mechanism}")),
            _ => tracing::debug!(send = %String::from_utf8_lossy(&data).trim_end()),
        }
        self.stream.write_all(&data).await?;
        Self::read_reply(&mut self.stream).await
    }

    async fn send_line(&mut self, line: &[u8]) -> Result<Reply> {
        self.stream.write_all(line).await?;
        self.stream.write_all(b"\r\n").await?;
        Self::read_reply(&mut self.stream).await
    }

    async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = stream.read_line().await?;
            if line.is_empty() {
                continue;
            }

            let last = ReplyLine::parse(&line)?.last;
            lines.push(line);
            if last {
                break;
            }
        }

        parse_reply(&lines)
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;
        // The peer may close without waiting for our FIN; that is fine.
        let _ = self.stream.shutdown().await;

        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        Ok(())
    }
}

fn parse_extensions(reply: &Reply) -> HashSet<Extension> {
    // First line is the server's greeting, the rest are keywords
    reply
        .message
        .iter()
        .skip(1)
        .map(|line| Extension::parse(line))
        .collect()
}
