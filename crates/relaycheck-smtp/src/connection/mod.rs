//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{Authenticated, Client, Connected, Login, SmtpConnection, StartTls};
pub use stream::{SmtpStream, tls_connector};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns supported authentication mechanisms.
    ///
    /// Servers occasionally repeat the AUTH line; all of them are merged.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        let mut mechanisms = Vec::new();
        for ext in &self.extensions {
            if let Extension::Auth(advertised) = ext {
                for mechanism in advertised {
                    if !mechanisms.contains(mechanism) {
                        mechanisms.push(*mechanism);
                    }
                }
            }
        }
        mechanisms
    }
}
