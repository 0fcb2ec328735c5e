//! Error types for the ia.json client.

use std::time::Duration;

use crate::transport::TransportError;

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum IaJsonError {
    /// Manifest discovery or validation failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Credentials missing locally or rejected by the site.
    #[error("authentication failed ({kind}): {message}")]
    Authentication {
        kind: AuthErrorKind,
        code: Option<String>,
        status: Option<u16>,
        message: String,
    },

    /// Rate limit exceeded (429).
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other error response from the site.
    #[error("protocol error (HTTP {status}): {message}")]
    Protocol {
        status: u16,
        code: Option<String>,
        message: String,
        details: serde_json::Value,
    },

    /// Rejected locally before any network I/O.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Response could not be understood.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Transport failure; the underlying cause is kept as the source.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Discovery failures.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// No manifest at either well-known location.
    #[error("no ia.json found for {domain} (tried {})", .attempted.join(", "))]
    NotFound {
        domain: String,
        attempted: Vec<String>,
    },

    /// Body is not a manifest.
    #[error("invalid ia.json from {url}: {reason}")]
    InvalidFormat { url: String, reason: String },

    /// Domain empty after normalization.
    #[error("invalid domain: {input:?}")]
    InvalidDomain { input: String },

    /// Body exceeds the size ceiling.
    #[error("ia.json at {url} exceeds {limit} bytes")]
    FileTooLarge { url: String, limit: usize },

    /// Major version not supported.
    #[error("unsupported ia.json version {version} (supported major: {supported})")]
    UnsupportedVersion { version: String, supported: u64 },

    /// Non-404 error status at a discovery location.
    #[error("failed to fetch {url}: HTTP {status}")]
    Http { url: String, status: u16 },
}

/// Authentication failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    MissingCredentials,
    InvalidKey,
    ExpiredTimestamp,
    InvalidSignature,
    AgentBlocked,
    MissingOAuthToken,
    /// OAuth token endpoint refused the grant.
    TokenRejected,
    /// 401/403 without a recognised error code.
    Rejected,
}

impl AuthErrorKind {
    /// Map a server error code onto a kind.
    pub fn from_code(code: &str) -> Self {
        match code {
            "missing_credentials" => Self::MissingCredentials,
            "invalid_key" => Self::InvalidKey,
            "expired_timestamp" => Self::ExpiredTimestamp,
            "invalid_signature" => Self::InvalidSignature,
            "agent_blocked" => Self::AgentBlocked,
            "missing_oauth_token" => Self::MissingOAuthToken,
            _ => Self::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidKey => "invalid_key",
            Self::ExpiredTimestamp => "expired_timestamp",
            Self::InvalidSignature => "invalid_signature",
            Self::AgentBlocked => "agent_blocked",
            Self::MissingOAuthToken => "missing_oauth_token",
            Self::TokenRejected => "token_rejected",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local validation failures, raised before any request is sent.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("missing path parameter '{name}' for {operation}")]
    MissingParameter { operation: String, name: String },

    #[error("unknown operation '{name}' (available: {})", .available.join(", "))]
    UnknownOperation {
        name: String,
        available: Vec<String>,
    },

    #[error("path parameter for {operation} resolves to dot segment '{segment}'")]
    InvalidPathSegment { operation: String, segment: String },

    #[error("invalid registration: {reason}")]
    InvalidRegistration { reason: String },

    #[error("invalid PKCE verifier: {reason}")]
    InvalidPkceVerifier { reason: String },

    #[error("parameters must be a JSON object")]
    InvalidParameters,
}

impl IaJsonError {
    /// Local authentication failure (no HTTP status, no server code).
    pub fn auth(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self::Authentication {
            kind,
            code: None,
            status: None,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Authentication kind, if this is an authentication failure.
    pub fn auth_kind(&self) -> Option<AuthErrorKind> {
        match self {
            Self::Authentication { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Not found / config / local input
            Self::Discovery(DiscoveryError::NotFound { .. }) => 1,
            Self::Config { .. } => 1,
            Self::Validation(_) => 1,

            // Auth issues
            Self::Authentication { .. } => 2,

            // Untrusted or malformed site data
            Self::Discovery(_) => 3,
            Self::InvalidResponse { .. } => 3,

            // Network/transient
            Self::RateLimited { .. } => 5,
            Self::Transport(_) => 5,

            // Other
            Self::Protocol { .. } => 6,
        }
    }

    /// Whether a caller-level retry policy may retry. The client never retries itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Transport(e) => e.is_transient(),
            Self::Protocol { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for client operations.
pub type IaJsonResult<T> = Result<T, IaJsonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_kind_from_code() {
        assert_eq!(
            AuthErrorKind::from_code("invalid_signature"),
            AuthErrorKind::InvalidSignature
        );
        assert_eq!(
            AuthErrorKind::from_code("agent_blocked"),
            AuthErrorKind::AgentBlocked
        );
        assert_eq!(AuthErrorKind::from_code("whatever"), AuthErrorKind::Rejected);
    }

    #[test]
    fn test_not_found_names_both_urls() {
        let err = IaJsonError::from(DiscoveryError::NotFound {
            domain: "example.com".into(),
            attempted: vec![
                "https://example.com/ia.json".into(),
                "https://example.com/.well-known/ia.json".into(),
            ],
        });
        let msg = err.to_string();
        assert!(msg.contains("https://example.com/ia.json"));
        assert!(msg.contains("https://example.com/.well-known/ia.json"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_retryable() {
        assert!(IaJsonError::RateLimited { retry_after: None }.is_retryable());
        assert!(IaJsonError::Transport(TransportError::Timeout {
            url: "https://x".into()
        })
        .is_retryable());
        assert!(!IaJsonError::auth(AuthErrorKind::InvalidKey, "bad key").is_retryable());
        assert!(!IaJsonError::from(ValidationError::InvalidParameters).is_retryable());
    }
}
