//! Credential types and the credential store seam.
//!
//! Secrets are wrapped in [`SecretString`], whose `Debug` output is redacted
//! and which has no `Serialize` impl.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Seconds before `expires_at` at which a token is already treated as expired.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

/// String that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// API key and shared secret issued by a site's registration endpoint.
#[derive(Debug, Clone)]
pub struct KeyCredential {
    pub api_key: String,
    pub secret: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
    pub permissions: Vec<String>,
}

impl KeyCredential {
    pub fn new(api_key: impl Into<String>, secret: impl Into<SecretString>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            expires_at: None,
            permissions: Vec::new(),
        }
    }

    /// Usable for signing: both halves non-empty.
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.secret.is_empty()
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp.timestamp())
    }
}

/// OAuth2 access token with advisory expiry.
#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Unix seconds; `None` when the server sent no `expires_in`.
    pub expires_at: Option<i64>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Bearer token without expiry or refresh capability.
    pub fn bearer(access_token: impl Into<SecretString>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    /// True once `now >= expires_at - 30s`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|exp| now >= exp.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS))
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// Mutable credential cell owned by the embedding application.
#[async_trait]
pub trait CredentialStore: Send + Sync + fmt::Debug {
    async fn key_credential(&self) -> Option<KeyCredential>;

    async fn set_key_credential(&self, credential: KeyCredential);

    async fn oauth_token(&self) -> Option<OAuthToken>;

    async fn set_oauth_token(&self, token: OAuthToken);

    async fn clear(&self);
}

/// Process-local [`CredentialStore`].
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    key: RwLock<Option<KeyCredential>>,
    token: RwLock<Option<OAuthToken>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_credential(credential: KeyCredential) -> Self {
        Self {
            key: RwLock::new(Some(credential)),
            token: RwLock::new(None),
        }
    }

    /// Seed from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `IAJSON_API_KEY` + `IAJSON_SECRET` | Signed-key credential |
    /// | `IAJSON_ACCESS_TOKEN` | OAuth2 bearer token |
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let key = match (non_empty("IAJSON_API_KEY"), non_empty("IAJSON_SECRET")) {
            (Some(api_key), Some(secret)) => Some(KeyCredential::new(api_key, secret)),
            _ => None,
        };
        let token = non_empty("IAJSON_ACCESS_TOKEN").map(OAuthToken::bearer);

        Self {
            key: RwLock::new(key),
            token: RwLock::new(token),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn key_credential(&self) -> Option<KeyCredential> {
        self.key.read().await.clone()
    }

    async fn set_key_credential(&self, credential: KeyCredential) {
        *self.key.write().await = Some(credential);
    }

    async fn oauth_token(&self) -> Option<OAuthToken> {
        self.token.read().await.clone()
    }

    async fn set_oauth_token(&self, token: OAuthToken) {
        *self.token.write().await = Some(token);
    }

    async fn clear(&self) {
        *self.key.write().await = None;
        *self.token.write().await = None;
    }
}
