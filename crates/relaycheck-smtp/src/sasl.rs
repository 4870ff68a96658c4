//! SASL payloads for the PLAIN (RFC 4616) and LOGIN mechanisms.
//!
//! Both sides live here: the client encodes, the test target decodes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// LOGIN challenge for the username (`Username:`).
pub const LOGIN_USERNAME_CHALLENGE: &str = "VXNlcm5hbWU6";

/// LOGIN challenge for the password (`Password:`).
pub const LOGIN_PASSWORD_CHALLENGE: &str = "UGFzc3dvcmQ6";

/// Error decoding a SASL payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaslError {
    /// Payload is not valid base64.
    #[error("invalid base64 payload")]
    Base64,
    /// Decoded payload is not UTF-8.
    #[error("payload is not valid UTF-8")]
    Utf8,
    /// PLAIN payload does not have the `authzid\0authcid\0passwd` shape.
    #[error("malformed PLAIN payload")]
    MalformedPlain,
}

/// Generates PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded)
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    // The first NUL is for the authorization identity (empty = same as auth identity)
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Encodes one LOGIN step (username or password).
#[must_use]
pub fn login_response(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Decodes a base64 text payload (a LOGIN step or a challenge).
///
/// # Errors
///
/// Returns an error if the payload is not base64 or not UTF-8.
pub fn decode_text(payload: &str) -> Result<String, SaslError> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| SaslError::Base64)?;
    String::from_utf8(bytes).map_err(|_| SaslError::Utf8)
}

/// Decodes a PLAIN payload into `(username, password)`.
///
/// The authorization identity is accepted but ignored.
///
/// # Errors
///
/// Returns an error if the payload is not base64, not UTF-8, or does not
/// contain exactly three NUL-separated fields.
pub fn decode_plain(payload: &str) -> Result<(String, String), SaslError> {
    let text = decode_text(payload)?;
    let mut fields = text.split('\0');
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(_authzid), Some(username), Some(password), None) => {
            Ok((username.to_string(), password.to_string()))
        }
        _ => Err(SaslError::MalformedPlain),
    }
}
