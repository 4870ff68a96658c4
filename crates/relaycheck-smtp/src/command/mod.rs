//! SMTP commands.
//!
//! The client serializes commands with [`Command::serialize`]; the test target
//! reads them back with [`Command::parse`].

use crate::types::{AuthMechanism, ReplyCode};

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Reverse path, empty for the null sender
        from: String,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Forward path
        to: String,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

/// Error while parsing a command line received from a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The verb is not one this server speaks.
    #[error("Command unrecognized: {0}")]
    Unrecognized(String),

    /// The verb is known but its arguments are malformed.
    #[error("Syntax error in parameters: {0}")]
    Syntax(String),

    /// AUTH named a mechanism that is not offered.
    #[error("Unrecognized authentication type: {0}")]
    UnsupportedMechanism(String),
}

impl CommandError {
    /// Returns the reply code a server should answer with.
    #[must_use]
    pub const fn reply_code(&self) -> ReplyCode {
        match self {
            Self::Unrecognized(_) => ReplyCode::SYNTAX_ERROR,
            Self::Syntax(_) => ReplyCode::PARAMETER_ERROR,
            Self::UnsupportedMechanism(_) => ReplyCode::PARAMETER_NOT_IMPLEMENTED,
        }
    }
}

impl Command {
    /// Serializes the command to bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Helo { hostname } => {
                buf.extend_from_slice(b"HELO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::Ehlo { hostname } => {
                buf.extend_from_slice(b"EHLO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::StartTls => {
                buf.extend_from_slice(b"STARTTLS");
            }
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTH ");
                buf.extend_from_slice(mechanism.as_str().as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    buf.extend_from_slice(resp.as_bytes());
                }
            }
            Self::MailFrom { from } => {
                buf.extend_from_slice(b"MAIL FROM:<");
                buf.extend_from_slice(from.as_bytes());
                buf.push(b'>');
            }
            Self::RcptTo { to } => {
                buf.extend_from_slice(b"RCPT TO:<");
                buf.extend_from_slice(to.as_bytes());
                buf.push(b'>');
            }
            Self::Data => {
                buf.extend_from_slice(b"DATA");
            }
            Self::Rset => {
                buf.extend_from_slice(b"RSET");
            }
            Self::Noop => {
                buf.extend_from_slice(b"NOOP");
            }
            Self::Quit => {
                buf.extend_from_slice(b"QUIT");
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Parses one command line (with or without the trailing CRLF).
    ///
    /// Verbs are case-insensitive. `MAIL`/`RCPT` accept any address between
    /// the angle brackets, including the null sender `<>`; ESMTP parameters
    /// after the path are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] describing which reply the server owes.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, rest) = line
            .split_once(' ')
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Ok(Self::Helo {
                hostname: required_argument(rest, "HELO")?,
            }),
            "EHLO" => Ok(Self::Ehlo {
                hostname: required_argument(rest, "EHLO")?,
            }),
            "STARTTLS" => no_argument(rest, "STARTTLS", Self::StartTls),
            "AUTH" => {
                let mut parts = rest.split_whitespace();
                let name = parts
                    .next()
                    .ok_or_else(|| CommandError::Syntax("AUTH requires a mechanism".into()))?;
                let mechanism = match AuthMechanism::parse(name) {
                    Some(mechanism @ (AuthMechanism::Plain | AuthMechanism::Login)) => mechanism,
                    _ => return Err(CommandError::UnsupportedMechanism(name.to_string())),
                };
                let initial_response = parts.next().map(str::to_string);
                if parts.next().is_some() {
                    return Err(CommandError::Syntax("too many AUTH arguments".into()));
                }
                Ok(Self::Auth {
                    mechanism,
                    initial_response,
                })
            }
            "MAIL" => Ok(Self::MailFrom {
                from: parse_path(rest, "FROM:")?,
            }),
            "RCPT" => Ok(Self::RcptTo {
                to: parse_path(rest, "TO:")?,
            }),
            "DATA" => no_argument(rest, "DATA", Self::Data),
            "RSET" => no_argument(rest, "RSET", Self::Rset),
            // NOOP may carry an ignored string argument (RFC 5321 §4.1.1.9)
            "NOOP" => Ok(Self::Noop),
            "QUIT" => no_argument(rest, "QUIT", Self::Quit),
            _ => Err(CommandError::Unrecognized(verb.to_string())),
        }
    }
}

fn required_argument(rest: &str, verb: &str) -> Result<String, CommandError> {
    if rest.is_empty() {
        Err(CommandError::Syntax(format!("{verb} requires a domain")))
    } else {
        Ok(rest.to_string())
    }
}

fn no_argument(rest: &str, verb: &str, command: Command) -> Result<Command, CommandError> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(CommandError::Syntax(format!("{verb} takes no arguments")))
    }
}

/// Extracts the address from `FROM:<addr> [params]` / `TO:<addr> [params]`.
fn parse_path(rest: &str, keyword: &str) -> Result<String, CommandError> {
    let syntax = || CommandError::Syntax(format!("expected {keyword}<address>"));

    let has_keyword = rest
        .get(..keyword.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(keyword));
    if !has_keyword {
        return Err(syntax());
    }
    let path = rest[keyword.len()..].trim_start();
    let path = path.strip_prefix('<').ok_or_else(syntax)?;
    let end = path.find('>').ok_or_else(syntax)?;
    Ok(path[..end].to_string())
}
