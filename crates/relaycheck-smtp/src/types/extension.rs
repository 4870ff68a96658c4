//! SMTP extension types.

/// SMTP extensions discovered from EHLO response.
///
/// Only the extensions the validator acts on get their own variant; anything
/// else a gateway advertises is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade
    StartTls,
    /// AUTH - Authentication
    Auth(Vec<AuthMechanism>),
    /// SIZE - Maximum message size
    Size(Option<usize>),
    /// Unknown extension
    Unknown(String),
}

impl Extension {
    /// Parses an extension line from EHLO response.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return Self::Unknown(line.to_string());
        }

        let keyword = parts[0].to_uppercase();
        match keyword.as_str() {
            "STARTTLS" => Self::StartTls,
            // Some older gateways still announce `AUTH=LOGIN PLAIN`.
            "AUTH" | "AUTH=LOGIN" | "AUTH=PLAIN" => {
                let first = parts[0].split_once('=').map(|(_, m)| m);
                let mechanisms = first
                    .into_iter()
                    .chain(parts[1..].iter().copied())
                    .filter_map(AuthMechanism::parse)
                    .collect();
                Self::Auth(mechanisms)
            }
            "SIZE" => {
                let size = parts.get(1).and_then(|s| s.parse().ok());
                Self::Size(size)
            }
            _ => Self::Unknown(line.to_string()),
        }
    }

    /// Returns the EHLO keyword line for this extension.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth(mechanisms) => {
                let mut line = String::from("AUTH");
                for mechanism in mechanisms {
                    line.push(' ');
                    line.push_str(mechanism.as_str());
                }
                line
            }
            Self::Size(Some(size)) => format!("SIZE {size}"),
            Self::Size(None) => "SIZE".to_string(),
            Self::Unknown(line) => line.clone(),
        }
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
    /// CRAM-MD5 - challenge-response (recognized, never used)
    CramMd5,
}

impl AuthMechanism {
    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
        }
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod extension_parse_tests {
        use super::*;

        #[test]
        fn parse_starttls() {
            assert_eq!(Extension::parse("STARTTLS"), Extension::StartTls);
            assert_eq!(Extension::parse("starttls"), Extension::StartTls);
        }

        #[test]
        fn parse_auth_mechanisms() {
            let ext = Extension::parse("AUTH PLAIN LOGIN XOAUTH2");
            assert_eq!(
                ext,
                Extension::Auth(vec![AuthMechanism::Plain, AuthMechanism::Login])
            );
        }

        #[test]
        fn parse_legacy_auth_equals_form() {
            let ext = Extension::parse("AUTH=LOGIN PLAIN");
            assert_eq!(
                ext,
                Extension::Auth(vec![AuthMechanism::Login, AuthMechanism::Plain])
            );
        }

        #[test]
        fn parse_size() {
            assert_eq!(
                Extension::parse("SIZE 52428800"),
                Extension::Size(Some(52_428_800))
            );
            assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
        }

        #[test]
        fn parse_unknown_and_empty() {
            assert_eq!(
                Extension::parse("PIPELINING"),
                Extension::Unknown("PIPELINING".to_string())
            );
            assert!(matches!(Extension::parse(""), Extension::Unknown(_)));
        }

        #[test]
        fn to_line_matches_parse() {
            let ext = Extension::Auth(vec![AuthMechanism::Plain, AuthMechanism::Login]);
            assert_eq!(ext.to_line(), "AUTH PLAIN LOGIN");
            assert_eq!(Extension::parse(&ext.to_line()), ext);
            assert_eq!(Extension::StartTls.to_line(), "STARTTLS");
        }
    }

    mod auth_mechanism_tests {
        use super::*;

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!(AuthMechanism::parse("PLAIN"), Some(AuthMechanism::Plain));
            assert_eq!(AuthMechanism::parse("login"), Some(AuthMechanism::Login));
            assert_eq!(
                AuthMechanism::parse("CRAM-MD5"),
                Some(AuthMechanism::CramMd5)
            );
            assert_eq!(AuthMechanism::parse("GSSAPI"), None);
        }
    }
}
