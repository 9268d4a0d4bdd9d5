use std::fmt;

use chrono::{DateTime, Utc};

/// Which lookup tier produced a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Cache,
    LocalStore,
    NativeBridge,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::LocalStore => "local-store",
            Self::NativeBridge => "native-bridge",
        }
    }
}

/// A resolved API key. The secret is only reachable through [`Credential::secret`]
/// and never appears in `Debug` output.
#[derive(Clone)]
pub struct Credential {
    secret: String,
    source: CredentialSource,
    resolved_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(secret: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            secret: secret.into(),
            source,
            resolved_at: Utc::now(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    /// Same secret and timestamp, re-tagged as served from another tier.
    pub fn with_source(mut self, source: CredentialSource) -> Self {
        self.source = source;
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"[REDACTED]")
            .field("source", &self.source)
            .field("resolved_at", &self.resolved_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let cred = Credential::new("sk-super-secret-key-12345", CredentialSource::LocalStore);
        let out = format!("{cred:?}");
        assert!(!out.contains("sk-super-secret-key-12345"), "leaked: {out}");
        assert!(out.contains("LocalStore"));
    }

    #[test]
    fn with_source_keeps_secret_and_timestamp() {
        let cred = Credential::new("sk-test", CredentialSource::NativeBridge);
        let at = cred.resolved_at();
        let cached = cred.with_source(CredentialSource::Cache);
        assert_eq!(cached.secret(), "sk-test");
        assert_eq!(cached.source(), CredentialSource::Cache);
        assert_eq!(cached.resolved_at(), at);
    }
}
