use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Wire-level error classification. Every failure that reaches a UI context
/// is reduced to one of these names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    NoCredentialConfigured,
    BridgeUnavailable,
    BridgeTimeout,
    BridgeMalformed,
    NetworkError,
    AuthError,
    RateLimited,
    UpstreamError,
    MalformedUpstreamResponse,
    StorageUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::NoCredentialConfigured => "NoCredentialConfigured",
            Self::BridgeUnavailable => "BridgeUnavailable",
            Self::BridgeTimeout => "BridgeTimeout",
            Self::BridgeMalformed => "BridgeMalformed",
            Self::NetworkError => "NetworkError",
            Self::AuthError => "AuthError",
            Self::RateLimited => "RateLimited",
            Self::UpstreamError => "UpstreamError",
            Self::MalformedUpstreamResponse => "MalformedUpstreamResponse",
            Self::StorageUnavailable => "StorageUnavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Local credential storage failed. Never retried here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StorageUnavailable
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// No transport, host failed to launch, or host exited without replying.
    #[error("native bridge unavailable: {0}")]
    Unavailable(String),

    #[error("native bridge timed out after {0}ms")]
    Timeout(u64),

    #[error("malformed native bridge response: {0}")]
    Malformed(String),

    /// Host answered with an empty key.
    #[error("native host has no API key configured")]
    NotConfigured,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::BridgeUnavailable,
            Self::Timeout(_) => ErrorKind::BridgeTimeout,
            Self::Malformed(_) => ErrorKind::BridgeMalformed,
            Self::NotConfigured => ErrorKind::NoCredentialConfigured,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no credential configured")]
    NoCredentialConfigured,

    /// Cache and store were empty and the bridge tier failed outright.
    #[error(transparent)]
    Bridge(BridgeError),
}

impl ResolutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoCredentialConfigured => ErrorKind::NoCredentialConfigured,
            Self::Bridge(e) => e.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream rejected credential ({status})")]
    Auth { status: u16 },

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl CompletionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Auth { .. } => ErrorKind::AuthError,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::Malformed(_) => ErrorKind::MalformedUpstreamResponse,
        }
    }

    /// Only an auth rejection says anything about the cached credential.
    pub fn invalidates_credential(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        // Strip the URL so logs don't carry endpoint query strings.
        Self::Network(e.without_url().to_string())
    }
}

/// Framing or encoding failure on a native-messaging stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_as_bare_name() {
        let json = serde_json::to_string(&ErrorKind::NoCredentialConfigured).unwrap();
        assert_eq!(json, "\"NoCredentialConfigured\"");
    }

    #[test]
    fn bridge_timeout_and_unavailable_are_distinct_kinds() {
        assert_eq!(BridgeError::Timeout(3000).kind(), ErrorKind::BridgeTimeout);
        assert_eq!(
            BridgeError::Unavailable("gone".into()).kind(),
            ErrorKind::BridgeUnavailable
        );
        assert_ne!(
            ResolutionError::Bridge(BridgeError::Timeout(1)).kind(),
            ResolutionError::Bridge(BridgeError::Unavailable(String::new())).kind()
        );
    }

    #[test]
    fn only_auth_invalidates() {
        assert!(CompletionError::Auth { status: 401 }.invalidates_credential());
        assert!(!CompletionError::RateLimited.invalidates_credential());
        assert!(!CompletionError::Network("refused".into()).invalidates_credential());
        assert!(
            !CompletionError::Upstream {
                status: 500,
                message: String::new()
            }
            .invalidates_credential()
        );
    }
}
