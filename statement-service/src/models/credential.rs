//! Provider access token bound to one organization.

use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use std::hash::{Hash, Hasher};

/// Opaque provider token. Identifies a rate-limit bucket.
///
/// The raw value is only reachable through [`Credential::expose`]; logs,
/// cool-down keys and `Debug` output use the SHA-256 fingerprint instead.
#[derive(Clone)]
pub struct Credential {
    token: Secret<String>,
    fingerprint: String,
}

impl Credential {
    /// Returns `None` for a blank token (an organization without a source).
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return None;
        }
        let fingerprint = hex::encode(Sha256::digest(token.as_bytes()));
        Some(Self {
            token: Secret::new(token),
            fingerprint,
        })
    }

    pub fn expose(&self) -> &str {
        self.token.expose_secret()
    }

    /// Hex SHA-256 of the token.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Short prefix of the fingerprint for log fields.
    pub fn short_id(&self) -> &str {
        &self.fingerprint[..12]
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for Credential {}

impl Hash for Credential {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({})", self.short_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_are_not_credentials() {
        assert!(Credential::new("").is_none());
        assert!(Credential::new("   ").is_none());
    }

    #[test]
    fn equality_follows_token_value() {
        let a = Credential::new("uXyZ-token").unwrap();
        let b = Credential::new(" uXyZ-token ").unwrap();
        let c = Credential::new("other").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn debug_never_prints_the_token() {
        let c = Credential::new("super-secret-token").unwrap();
        let printed = format!("{:?}", c);
        assert!(!printed.contains("super-secret-token"));
        assert!(printed.starts_with("Credential("));
    }
}
