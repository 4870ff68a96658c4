//! Reply parsing.
//!
//! Replies are read one line at a time. Each line is split into its code,
//! separator and text by [`ReplyLine::parse`]; [`parse_reply`] assembles a
//! sequence of lines into a [`Reply`] and checks that they agree on the code.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// One line of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLine<'a> {
    /// The three-digit code.
    pub code: ReplyCode,
    /// False if the separator was `-`.
    pub last: bool,
    /// Everything after the separator.
    pub text: &'a str,
}

impl<'a> ReplyLine<'a> {
    /// Splits a line (without CRLF) into its parts.
    ///
    /// A bare code such as `354` is a complete, final line with no text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the line does not start with three
    /// digits followed by a space, a dash or nothing.
    pub fn parse(line: &'a str) -> Result<Self> {
        let malformed = || Error::Protocol(format!("Malformed reply line: {line}"));

        let digits = line.get(..3).ok_or_else(malformed)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let code = ReplyCode::new(digits.parse().map_err(|_| malformed())?);

        let (last, text) = match line.as_bytes().get(3) {
            None => (true, ""),
            Some(b' ') => (true, &line[4..]),
            Some(b'-') => (false, &line[4..]),
            Some(_) => return Err(malformed()),
        };
        Ok(Self { code, last, text })
    }
}

/// Assembles the lines of one reply.
///
/// # Errors
///
/// Returns an error if there are no lines, a line is malformed, or the
/// lines carry different codes.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let mut code = None;
    let mut message = Vec::with_capacity(lines.len());

    for line in lines {
        let parsed = ReplyLine::parse(line)?;
        match code {
            None => code = Some(parsed.code),
            Some(expected) if expected != parsed.code => {
                return Err(Error::Protocol(format!(
                    "Reply code changed from {expected} to {} mid-reply",
                    parsed.code
                )));
            }
            Some(_) => {}
        }
        message.push(parsed.text.to_string());
    }

    let code = code.ok_or_else(|| Error::Protocol("Empty reply".into()))?;
    Ok(Reply::new(code, message))
}
