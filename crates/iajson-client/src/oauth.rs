//! OAuth2 for `user_required` operations.
//!
//! Covers the authorization-code grant (with PKCE), refresh, and the
//! client-credentials grant when the site lists it. The held token lives in a
//! `tokio::sync::Mutex`; an expired token is refreshed while the lock is held,
//! so concurrent callers share a single in-flight refresh.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::http::{map_token_error, send_checked};
use crate::clock::{Clock, SystemClock};
use crate::credentials::{CredentialStore, OAuthToken, SecretString};
use crate::error::{AuthErrorKind, IaJsonError, IaJsonResult, ValidationError};
use crate::manifest::{Manifest, OAuth2Config};
use crate::transport::{HttpMethod, HttpRequest, Transport};

/// Only supported `code_challenge_method`.
pub const PKCE_METHOD: &str = "S256";

const VERIFIER_BYTES: usize = 48;
const STATE_BYTES: usize = 16;

/// PKCE verifier/challenge pair. Generate a fresh one per authorization attempt.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    verifier: SecretString,
    challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rng.fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = s256_challenge(&verifier);
        Self {
            verifier: verifier.into(),
            challenge,
        }
    }

    /// Rebuild from a caller-held verifier (43-128 unreserved characters).
    pub fn from_verifier(verifier: impl Into<String>) -> Result<Self, ValidationError> {
        let verifier = verifier.into();
        if !(43..=128).contains(&verifier.len()) {
            return Err(ValidationError::InvalidPkceVerifier {
                reason: format!("length {} outside 43..=128", verifier.len()),
            });
        }
        if let Some(bad) = verifier
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')))
        {
            return Err(ValidationError::InvalidPkceVerifier {
                reason: format!("character {bad:?} is not allowed"),
            });
        }
        let challenge = s256_challenge(&verifier);
        Ok(Self {
            verifier: verifier.into(),
            challenge,
        })
    }

    pub fn verifier(&self) -> &str {
        self.verifier.expose()
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn method(&self) -> &'static str {
        PKCE_METHOD
    }
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random CSRF `state` value (16 bytes, hex).
pub fn generate_state() -> String {
    generate_state_with(&mut OsRng)
}

pub fn generate_state_with<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Everything the application needs to send the user off and handle the redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    /// Present whenever a challenge was put on the URL; keep the verifier for the exchange.
    pub pkce: Option<PkceChallenge>,
}

/// Build the authorization redirect URL.
///
/// `scopes` defaults to every scope the site declares. `state` defaults to a
/// fresh random value. When the site requires PKCE and none is supplied, one
/// is generated and returned with the request.
pub fn build_authorization_url(
    config: &OAuth2Config,
    client_id: &str,
    redirect_uri: &str,
    scopes: Option<&[String]>,
    state: Option<&str>,
    pkce: Option<PkceChallenge>,
) -> IaJsonResult<AuthorizationRequest> {
    let mut url = url::Url::parse(&config.authorization_url).map_err(|e| {
        IaJsonError::config(format!(
            "invalid authorization_url {}: {e}",
            config.authorization_url
        ))
    })?;

    let scope = match scopes {
        Some(scopes) => scopes.join(" "),
        None => config.scopes.keys().cloned().collect::<Vec<_>>().join(" "),
    };
    let state = state.map(String::from).unwrap_or_else(generate_state);
    let pkce = match pkce {
        Some(pkce) => Some(pkce),
        None if config.pkce_required => Some(PkceChallenge::generate()),
        None => None,
    };

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri);
        if !scope.is_empty() {
            query.append_pair("scope", &scope);
        }
        query.append_pair("state", &state);
        if let Some(pkce) = &pkce {
            query
                .append_pair("code_challenge", pkce.challenge())
                .append_pair("code_challenge_method", PKCE_METHOD);
        }
    }

    Ok(AuthorizationRequest {
        url: url.into(),
        state,
        pkce,
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token(self, now: i64) -> IaJsonResult<OAuthToken> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IaJsonError::invalid_response("token response has no access_token"))?;
        Ok(OAuthToken {
            access_token: access_token.into(),
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            // Non-positive lifetimes carry no usable expiry.
            expires_at: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now.saturating_add(secs)),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: self.scope,
        })
    }
}

/// Token lifecycle for one site and one OAuth client.
#[derive(Debug)]
pub struct OAuthFlow {
    config: OAuth2Config,
    client_id: String,
    client_secret: Option<SecretString>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    store: Option<Arc<dyn CredentialStore>>,
    token: Mutex<Option<OAuthToken>>,
}

impl OAuthFlow {
    pub fn new(
        config: OAuth2Config,
        client_id: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            client_id: client_id.into(),
            client_secret: None,
            transport,
            clock: Arc::new(SystemClock),
            timeout: Duration::from_secs(30),
            store: None,
            token: Mutex::new(None),
        }
    }

    /// Flow for a manifest's `auth.oauth2` section.
    pub fn from_manifest(
        manifest: &Manifest,
        client_id: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> IaJsonResult<Self> {
        let config = manifest.oauth2().cloned().ok_or_else(|| {
            IaJsonError::config(format!(
                "site '{}' does not declare auth.oauth2",
                manifest.site.name
            ))
        })?;
        Ok(Self::new(config, client_id, transport))
    }

    pub fn with_client_secret(mut self, secret: impl Into<SecretString>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Mirror every new token into `store`.
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_token(self, token: OAuthToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
            ..self
        }
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn authorization_request(
        &self,
        redirect_uri: &str,
        scopes: Option<&[String]>,
        state: Option<&str>,
    ) -> IaJsonResult<AuthorizationRequest> {
        let pkce = self.config.pkce_required.then(PkceChallenge::generate);
        build_authorization_url(
            &self.config,
            &self.client_id,
            redirect_uri,
            scopes,
            state,
            pkce,
        )
    }

    /// Exchange an authorization code for a token and hold it.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> IaJsonResult<OAuthToken> {
        if self.config.pkce_required && code_verifier.is_none() {
            return Err(IaJsonError::config(
                "site requires PKCE; pass the verifier from the authorization request",
            ));
        }

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        let token = self.request_token(form).await?;
        info!(client_id = %self.client_id, "authorization code exchanged");
        self.hold(token.clone()).await;
        Ok(token)
    }

    /// Client-credentials grant; only when the site lists it.
    pub async fn client_credentials(&self, scopes: Option<&[String]>) -> IaJsonResult<OAuthToken> {
        if !self.config.supports_grant("client_credentials") {
            return Err(IaJsonError::config(
                "site does not allow the client_credentials grant",
            ));
        }

        let scope = scopes.map(|s| s.join(" "));
        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = scope.as_deref() {
            form.push(("scope", scope));
        }

        let token = self.request_token(form).await?;
        info!(client_id = %self.client_id, "client credentials token issued");
        self.hold(token.clone()).await;
        Ok(token)
    }

    /// Refresh the held token now, regardless of expiry.
    pub async fn refresh(&self) -> IaJsonResult<OAuthToken> {
        let mut guard = self.token.lock().await;
        let current = guard.clone().ok_or_else(|| {
            IaJsonError::auth(AuthErrorKind::MissingOAuthToken, "no OAuth token to refresh")
        })?;
        let token = self.refresh_locked(&current).await?;
        *guard = Some(token.clone());
        drop(guard);
        self.mirror(&token).await;
        Ok(token)
    }

    /// Held token, refreshed first if it is within the expiry margin.
    ///
    /// A failed or impossible refresh is an error; an expired token is never
    /// handed out.
    pub async fn current_token(&self) -> IaJsonResult<OAuthToken> {
        let mut guard = self.token.lock().await;
        let current = guard.clone().ok_or_else(|| {
            IaJsonError::auth(
                AuthErrorKind::MissingOAuthToken,
                "no OAuth token; complete the authorization flow first",
            )
        })?;

        if !current.is_expired_at(self.clock.now_unix()) {
            return Ok(current);
        }

        debug!(client_id = %self.client_id, "access token expired; refreshing");
        let token = match self.refresh_locked(&current).await {
            Ok(token) => token,
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "token refresh failed");
                return Err(e);
            }
        };
        *guard = Some(token.clone());
        drop(guard);
        self.mirror(&token).await;
        Ok(token)
    }

    pub async fn token(&self) -> Option<OAuthToken> {
        self.token.lock().await.clone()
    }

    pub async fn has_token(&self) -> bool {
        self.token.lock().await.is_some()
    }

    pub async fn set_token(&self, token: OAuthToken) {
        self.hold(token).await;
    }

    pub async fn clear(&self) {
        *self.token.lock().await = None;
    }

    async fn refresh_locked(&self, current: &OAuthToken) -> IaJsonResult<OAuthToken> {
        let refresh_token = current
            .refresh_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                IaJsonError::auth(
                    AuthErrorKind::MissingOAuthToken,
                    "access token expired and no refresh token is held",
                )
            })?;

        let mut token = self
            .request_token(vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose()),
            ])
            .await?;
        if token.refresh_token.is_none() {
            token.refresh_token = current.refresh_token.clone();
        }
        info!(client_id = %self.client_id, "access token refreshed");
        Ok(token)
    }

    async fn request_token<'a>(
        &'a self,
        mut form: Vec<(&'a str, &'a str)>,
    ) -> IaJsonResult<OAuthToken> {
        form.push(("client_id", self.client_id.as_str()));
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose()));
        }

        let request = HttpRequest::new(HttpMethod::Post, &self.config.token_url, self.timeout)
            .header("Accept", "application/json")
            .form_body(&form);

        let response = send_checked(self.transport.as_ref(), request, map_token_error).await?;
        let parsed: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
            IaJsonError::invalid_response(format!("malformed token response: {e}"))
        })?;
        parsed.into_token(self.clock.now_unix())
    }

    async fn hold(&self, token: OAuthToken) {
        *self.token.lock().await = Some(token.clone());
        self.mirror(&token).await;
    }

    async fn mirror(&self, token: &OAuthToken) {
        if let Some(store) = &self.store {
            store.set_oauth_token(token.clone()).await;
        }
    }
}
