//! One SMTP session on the test target.
//!
//! The session speaks just enough SMTP for a submission client to prove it
//! can connect, upgrade and authenticate. Message content is read line by
//! line and dropped; only its size is kept for the log.

use std::io;
use std::net::SocketAddr;

use relaycheck_smtp::sasl::{self, LOGIN_PASSWORD_CHALLENGE, LOGIN_USERNAME_CHALLENGE};
use relaycheck_smtp::{AuthMechanism, Command, CommandError, Extension, MAX_LINE_LEN, Reply, ReplyCode};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use crate::server::Shared;

/// Connection to one client, plaintext or upgraded.
enum Transport {
    Plain(BufReader<TcpStream>),
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
}

/// Result of reading one line.
enum Line {
    Complete,
    TooLong,
    Closed,
}

impl Transport {
    const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    async fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<Line> {
        match self {
            Self::Plain(reader) => read_bounded(reader, buf).await,
            Self::Tls(reader) => read_bounded(&mut **reader, buf).await,
        }
    }

    async fn send(&mut self, reply: &Reply) -> io::Result<()> {
        let data = reply.serialize();
        tracing::debug!(send = %String::from_utf8_lossy(&data).trim_end());
        match self {
            Self::Plain(reader) => {
                reader.get_mut().write_all(&data).await?;
                reader.get_mut().flush().await
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(&data).await?;
                reader.get_mut().flush().await
            }
        }
    }

    async fn upgrade(self, acceptor: &TlsAcceptor) -> io::Result<Self> {
        match self {
            Self::Plain(reader) => {
                // Anything pipelined before the handshake is discarded (RFC 3207)
                let tls = acceptor.accept(reader.into_inner()).await?;
                Ok(Self::Tls(Box::new(BufReader::new(tls))))
            }
            Self::Tls(_) => Err(io::Error::other("session already uses TLS")),
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(reader) => reader.get_mut().shutdown().await,
            Self::Tls(reader) => reader.get_mut().shutdown().await,
        }
    }
}

/// Reads one line of at most [`MAX_LINE_LEN`] bytes.
///
/// The remainder of an overlong line is consumed and discarded.
async fn read_bounded<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_LINE_LEN as u64;
    buf.clear();
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Line::Closed);
    }
    if buf.ends_with(b"\n") || (read as u64) < limit {
        return Ok(Line::Complete);
    }

    let mut rest = Vec::new();
    loop {
        rest.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', &mut rest).await?;
        if read == 0 || rest.ends_with(b"\n") {
            return Ok(Line::TooLong);
        }
    }
}

/// What the connection loop does after a command.
enum Next {
    Continue,
    StartTls(TlsAcceptor),
    Quit,
}

/// Answer to a SASL challenge.
enum Answer {
    Text(String),
    Cancelled,
    Garbled,
}

/// Sender and recipients of the current transaction.
struct Envelope {
    from: String,
    recipients: Vec<String>,
}

struct Session<'a> {
    shared: &'a Shared,
    peer: SocketAddr,
    greeted: bool,
    authenticated: Option<String>,
    envelope: Option<Envelope>,
}

/// Serves one client until it quits, disconnects or goes idle.
pub(crate) async fn serve(tcp: TcpStream, peer: SocketAddr, shared: &Shared) -> io::Result<()> {
    let mut transport = Transport::Plain(BufReader::new(tcp));
    let mut session = Session {
        shared,
        peer,
        greeted: false,
        authenticated: None,
        envelope: None,
    };

    transport.send(&session.greeting()).await?;

    let mut buf = Vec::with_capacity(512);
    loop {
        let line = match session.read_line(&mut transport, &mut buf).await {
            Ok(line) => line,
            Err(error) if error.kind() == io::ErrorKind::TimedOut => {
                return session.close_idle(&mut transport).await;
            }
            Err(error) => return Err(error),
        };

        match line {
            Line::Closed => return Ok(()),
            Line::TooLong => {
                transport
                    .send(&Reply::single(ReplyCode::SYNTAX_ERROR, "5.5.2 Line too long"))
                    .await?;
                continue;
            }
            Line::Complete => {}
        }

        let text = String::from_utf8_lossy(&buf);
        let text = text.trim_end_matches(['\r', '\n']);
        match session.handle(text, &mut transport).await {
            Ok(Next::Continue) => {}
            Ok(Next::StartTls(acceptor)) => {
                transport = transport.upgrade(&acceptor).await?;
                session.reset_after_tls();
                tracing::debug!(%peer, "Session upgraded to TLS");
            }
            Ok(Next::Quit) => {
                let _ = transport.shutdown().await;
                return Ok(());
            }
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            // A client that stalls mid-AUTH or mid-DATA is idle too
            Err(error) if error.kind() == io::ErrorKind::TimedOut => {
                return session.close_idle(&mut transport).await;
            }
            Err(error) => return Err(error),
        }
    }
}

impl Session<'_> {
    fn hostname(&self) -> &str {
        &self.shared.config.hostname
    }

    fn greeting(&self) -> Reply {
        Reply::single(
            ReplyCode::SERVICE_READY,
            format!("{} ESMTP relaycheck test target ready", self.hostname()),
        )
    }

    /// Sends the idle-timeout 421 and ends the session.
    async fn close_idle(&self, transport: &mut Transport) -> io::Result<()> {
        tracing::info!(peer = %self.peer, "Closing idle session");
        let reply = Reply::single(
            ReplyCode::SERVICE_UNAVAILABLE,
            format!("4.4.2 {} Idle timeout, closing connection", self.hostname()),
        );
        let _ = transport.send(&reply).await;
        Ok(())
    }

    async fn read_line(&self, transport: &mut Transport, buf: &mut Vec<u8>) -> io::Result<Line> {
        timeout(self.shared.config.idle_timeout, transport.read_line(buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "idle timeout"))?
    }

    fn reset_after_tls(&mut self) {
        self.greeted = false;
        self.authenticated = None;
        self.envelope = None;
    }

    async fn handle(&mut self, line: &str, transport: &mut Transport) -> io::Result<Next> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(error) => {
                tracing::debug!(peer = %self.peer, %error, "Rejected command");
                transport.send(&rejection(&error)).await?;
                return Ok(Next::Continue);
            }
        };

        let mut next = Next::Continue;
        let reply = match command {
            Command::Ehlo { hostname } => self.ehlo(&hostname, transport.is_tls()),
            Command::Helo { hostname } => {
                self.greeted = true;
                self.envelope = None;
                Reply::single(ReplyCode::OK, format!("{} Hello {hostname}", self.hostname()))
            }
            Command::StartTls => {
                let (reply, upgrade) = self.starttls(transport.is_tls());
                next = upgrade;
                reply
            }
            Command::Auth {
                mechanism,
                initial_response,
            } => self.auth(mechanism, initial_response, transport).await?,
            Command::MailFrom { from } => self.mail(from),
            Command::RcptTo { to } => self.rcpt(to),
            Command::Data => self.data(transport).await?,
            Command::Rset => {
                self.envelope = None;
                Reply::single(ReplyCode::OK, "2.0.0 OK")
            }
            Command::Noop => Reply::single(ReplyCode::OK, "2.0.0 OK"),
            Command::Quit => {
                next = Next::Quit;
                Reply::single(ReplyCode::CLOSING, "2.0.0 Bye")
            }
        };

        transport.send(&reply).await?;
        Ok(next)
    }

    fn ehlo(&mut self, client: &str, tls: bool) -> Reply {
        self.greeted = true;
        self.envelope = None;

        let mut lines = vec![format!("{} Hello {client}", self.hostname())];
        lines.push(Extension::Auth(vec![AuthMechanism::Plain, AuthMechanism::Login]).to_line());
        if self.shared.acceptor.is_some() && !tls {
            lines.push(Extension::StartTls.to_line());
        }
        Reply::new(ReplyCode::OK, lines)
    }

    fn starttls(&self, tls: bool) -> (Reply, Next) {
        if tls {
            return (
                Reply::single(ReplyCode::BAD_SEQUENCE, "5.5.1 TLS already active"),
                Next::Continue,
            );
        }
        match &self.shared.acceptor {
            Some(acceptor) => (
                Reply::single(ReplyCode::SERVICE_READY, "Ready to start TLS"),
                Next::StartTls(acceptor.clone()),
            ),
            None => (
                Reply::single(ReplyCode::TLS_UNAVAILABLE, "4.7.0 TLS not available"),
                Next::Continue,
            ),
        }
    }

    async fn auth(
        &mut self,
        mechanism: AuthMechanism,
        initial: Option<String>,
        transport: &mut Transport,
    ) -> io::Result<Reply> {
        if !self.greeted {
            return Ok(Reply::single(ReplyCode::BAD_SEQUENCE, "5.5.1 Send EHLO first"));
        }
        if self.authenticated.is_some() {
            return Ok(Reply::single(ReplyCode::BAD_SEQUENCE, "5.5.1 Already authenticated"));
        }
        if self.envelope.is_some() {
            return Ok(Reply::single(
                ReplyCode::BAD_SEQUENCE,
                "5.5.1 AUTH not permitted during a mail transaction",
            ));
        }

        let credentials = match mechanism {
            AuthMechanism::Plain => self.plain_credentials(initial, transport).await?,
            AuthMechanism::Login => self.login_credentials(initial, transport).await?,
            AuthMechanism::CramMd5 => {
                return Ok(Reply::single(
                    ReplyCode::PARAMETER_NOT_IMPLEMENTED,
                    "5.5.4 Unrecognized authentication type",
                ));
            }
        };
        let (username, password) = match credentials {
            Ok(pair) => pair,
            Err(reply) => return Ok(reply),
        };

        tracing::info!(peer = %self.peer, %mechanism, user = %username, "Auth attempt");
        if self.shared.verifier.verify(&username, &password) {
            tracing::info!(peer = %self.peer, user = %username, "Auth succeeded");
            self.authenticated = Some(username);
            Ok(Reply::single(ReplyCode::AUTH_SUCCESS, "2.7.0 Authentication successful"))
        } else {
            tracing::warn!(peer = %self.peer, user = %username, "Auth failed: wrong credentials");
            Ok(Reply::single(
                ReplyCode::AUTH_FAILED,
                "5.7.8 Authentication credentials invalid",
            ))
        }
    }

    async fn plain_credentials(
        &self,
        initial: Option<String>,
        transport: &mut Transport,
    ) -> io::Result<Result<(String, String), Reply>> {
        let payload = match initial {
            Some(payload) => payload,
            None => match self.challenge(transport, "").await? {
                Answer::Text(payload) => payload,
                Answer::Cancelled => return Ok(Err(cancelled())),
                Answer::Garbled => return Ok(Err(undecodable())),
            },
        };
        Ok(sasl::decode_plain(&initial_payload(&payload)).map_err(|_| undecodable()))
    }

    async fn login_credentials(
        &self,
        initial: Option<String>,
        transport: &mut Transport,
    ) -> io::Result<Result<(String, String), Reply>> {
        let username = match initial {
            Some(payload) => payload,
            None => match self.challenge(transport, LOGIN_USERNAME_CHALLENGE).await? {
                Answer::Text(payload) => payload,
                Answer::Cancelled => return Ok(Err(cancelled())),
                Answer::Garbled => return Ok(Err(undecodable())),
            },
        };
        let Ok(username) = sasl::decode_text(&initial_payload(&username)) else {
            return Ok(Err(undecodable()));
        };

        let password = match self.challenge(transport, LOGIN_PASSWORD_CHALLENGE).await? {
            Answer::Text(payload) => payload,
            Answer::Cancelled => return Ok(Err(cancelled())),
            Answer::Garbled => return Ok(Err(undecodable())),
        };
        let Ok(password) = sasl::decode_text(&password) else {
            return Ok(Err(undecodable()));
        };

        Ok(Ok((username, password)))
    }

    /// Sends a 334 challenge and reads the client's answer.
    async fn challenge(&self, transport: &mut Transport, text: &str) -> io::Result<Answer> {
        transport
            .send(&Reply::single(ReplyCode::AUTH_CONTINUE, text))
            .await?;

        let mut buf = Vec::new();
        match self.read_line(transport, &mut buf).await? {
            Line::Closed => Err(io::ErrorKind::UnexpectedEof.into()),
            Line::TooLong => Ok(Answer::Garbled),
            Line::Complete => {
                let answer = String::from_utf8_lossy(&buf);
                let answer = answer.trim();
                if answer == "*" {
                    Ok(Answer::Cancelled)
                } else {
                    Ok(Answer::Text(answer.to_string()))
                }
            }
        }
    }

    /// Returns a 530 reply if the transaction needs authentication first.
    fn require_auth(&self) -> Option<Reply> {
        (self.shared.config.auth_required && self.authenticated.is_none()).then(|| {
            Reply::single(ReplyCode::AUTH_REQUIRED, "5.7.0 Authentication required")
        })
    }

    fn mail(&mut self, from: String) -> Reply {
        if !self.greeted {
            return Reply::single(ReplyCode::BAD_SEQUENCE, "5.5.1 Send EHLO first");
        }
        if let Some(reply) = self.require_auth() {
            return reply;
        }
        if self.envelope.is_some() {
            return Reply::single(ReplyCode::BAD_SEQUENCE, "5.5.1 Sender already specified");
        }
        self.envelope = Some(Envelope {
            from,
            recipients: Vec::new(),
        });
        Reply::single(ReplyCode::OK, "2.1.0 OK")
    }

    fn rcpt(&mut self, to: String) -> Reply {
        if let Some(reply) = self.require_auth() {
            return reply;
        }
        match &mut self.envelope {
            Some(envelope) => {
                envelope.recipients.push(to);
                Reply::single(ReplyCode::OK, "2.1.5 OK")
            }
            None => Reply::single(ReplyCode::BAD_SEQUENCE, "5.5.1 Need MAIL before RCPT"),
        }
    }

    async fn data(&mut self, transport: &mut Transport) -> io::Result<Reply> {
        if let Some(reply) = self.require_auth() {
            return Ok(reply);
        }
        let Some(envelope) = self
            .envelope
            .take_if(|envelope| !envelope.recipients.is_empty())
        else {
            return Ok(Reply::single(ReplyCode::BAD_SEQUENCE, "5.5.1 Need RCPT before DATA"));
        };

        transport
            .send(&Reply::single(
                ReplyCode::START_DATA,
                "End data with <CR><LF>.<CR><LF>",
            ))
            .await?;

        let mut bytes = 0usize;
        let mut buf = Vec::with_capacity(MAX_LINE_LEN);
        loop {
            match self.read_line(transport, &mut buf).await? {
                Line::Closed => return Err(io::ErrorKind::UnexpectedEof.into()),
                Line::TooLong => bytes += MAX_LINE_LEN,
                Line::Complete if buf.trim_ascii_end() == b"." => break,
                Line::Complete => bytes += buf.len(),
            }
        }

        tracing::info!(
            peer = %self.peer,
            from = %envelope.from,
            to = ?envelope.recipients,
            bytes,
            "Message discarded"
        );
        Ok(Reply::single(
            ReplyCode::OK,
            "2.0.0 Message accepted (discarded - this is a test server)",
        ))
    }
}

/// `=` stands for an empty initial response (RFC 4954).
fn initial_payload(payload: &str) -> String {
    if payload == "=" {
        String::new()
    } else {
        payload.to_string()
    }
}

fn cancelled() -> Reply {
    Reply::single(ReplyCode::PARAMETER_ERROR, "5.7.0 Authentication cancelled")
}

fn undecodable() -> Reply {
    Reply::single(ReplyCode::PARAMETER_ERROR, "5.5.2 Cannot decode response")
}

fn rejection(error: &CommandError) -> Reply {
    let text = match error {
        CommandError::Unrecognized(_) => "5.5.2 Command unrecognized",
        CommandError::Syntax(_) => "5.5.4 Syntax error in parameters",
        CommandError::UnsupportedMechanism(_) => "5.5.4 Unrecognized authentication type",
    };
    Reply::single(error.reply_code(), text)
}
