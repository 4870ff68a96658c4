//! Replies and reply codes, for both ends of the wire.

use std::fmt;
use std::io::Write as _;

/// First digit of a reply code (RFC 5321 §4.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 2yz: the command completed.
    Positive,
    /// 3yz: more input is expected (AUTH challenge, DATA).
    Intermediate,
    /// 4yz: try again later.
    Transient,
    /// 5yz: do not repeat as is.
    Permanent,
    /// Anything outside 200..=599.
    Other,
}

/// Three-digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220, greeting and STARTTLS go-ahead.
    pub const SERVICE_READY: Self = Self(220);
    /// 221, answer to QUIT.
    pub const CLOSING: Self = Self(221);
    /// 235, credentials accepted.
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250, generic completion.
    pub const OK: Self = Self(250);
    /// 334, SASL challenge.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354, send message content.
    pub const START_DATA: Self = Self(354);
    /// 421, the server is closing the channel.
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 454, TLS cannot be started.
    pub const TLS_UNAVAILABLE: Self = Self(454);
    /// 500, unrecognized command or line too long.
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 501, bad arguments or undecodable SASL payload.
    pub const PARAMETER_ERROR: Self = Self(501);
    /// 503, command out of sequence.
    pub const BAD_SEQUENCE: Self = Self(503);
    /// 504, unsupported parameter such as an unknown SASL mechanism.
    pub const PARAMETER_NOT_IMPLEMENTED: Self = Self(504);
    /// 530, authentication needed first.
    pub const AUTH_REQUIRED: Self = Self(530);
    /// 535, credentials rejected.
    pub const AUTH_FAILED: Self = Self(535);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns the class given by the first digit.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::Positive,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::Transient,
            5 => ReplyClass::Permanent,
            _ => ReplyClass::Other,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// A complete reply: one code and one or more text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code.
    pub code: ReplyCode,
    /// Text of each line, without code or separator.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a reply from its lines.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Creates a one-line reply.
    #[must_use]
    pub fn single(code: ReplyCode, text: impl Into<String>) -> Self {
        Self::new(code, vec![text.into()])
    }

    /// Returns true for 2yz.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code.class(), ReplyClass::Positive)
    }

    /// Returns true for 4yz.
    #[must_use]
    pub const fn is_transient_error(&self) -> bool {
        matches!(self.code.class(), ReplyClass::Transient)
    }

    /// Returns true for 5yz.
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        matches!(self.code.class(), ReplyClass::Permanent)
    }

    /// Joins the text lines with `\n`.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Encodes the reply for the wire, `-` marking every line but the last.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.message.iter().map(|l| l.len() + 6).sum());
        let Some((last, init)) = self.message.split_last() else {
            let _ = write!(buf, "{}\r\n", self.code);
            return buf;
        };
        for line in init {
            let _ = write!(buf, "{}-{line}\r\n", self.code);
        }
        if last.is_empty() {
            let _ = write!(buf, "{}\r\n", self.code);
        } else {
            let _ = write!(buf, "{} {last}\r\n", self.code);
        }
        buf
    }
}
