//! Operation dispatcher.
//!
//! A [`Dispatcher`] binds one validated manifest to a transport, a credential
//! store and (optionally) an OAuth flow. Calls are resolved by operation name,
//! authenticated according to the operation's tier and sent exactly once.

pub(crate) mod helpers;
pub(crate) mod http;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::credentials::{
    CredentialStore, InMemoryCredentialStore, KeyCredential, OAuthToken, SecretString,
};
use crate::discovery::Discoverer;
use crate::endpoints::{EndpointIndex, Operation};
use crate::error::{AuthErrorKind, IaJsonError, IaJsonResult, ValidationError};
use crate::manifest::{AccessTier, Manifest};
use crate::oauth::OAuthFlow;
use crate::register::{default_verify_url, AgentInfo, Registrar};
use crate::signer::create_signed_headers_at;
use crate::transport::{HttpMethod, HttpRequest, ReqwestTransport, Transport};

/// A fully built request, ready for a [`Transport`].
///
/// `body` is the exact text that was signed.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub operation: String,
    pub tier: AccessTier,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn into_http_request(self, config: &ClientConfig) -> HttpRequest {
        let mut request = HttpRequest::new(self.method, self.url, config.timeout());
        request.headers = self.headers;
        request.body = self.body.map(String::into_bytes);
        request
    }
}

/// Client for one ia.json site.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    manifest: Arc<Manifest>,
    index: Arc<EndpointIndex>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    oauth: Option<Arc<OAuthFlow>>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
}

impl Dispatcher {
    /// Dispatcher over an already validated manifest, using the default
    /// transport and an empty in-memory credential store.
    pub fn new(manifest: Manifest, config: ClientConfig) -> IaJsonResult<Self> {
        let transport = ReqwestTransport::with_user_agent(&config.user_agent)?;
        Ok(Self::with_transport(manifest, config, Arc::new(transport)))
    }

    pub fn with_transport(
        manifest: Manifest,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let index = EndpointIndex::build(&manifest);
        debug!(
            site = %manifest.site.name,
            operations = index.len(),
            "endpoint index built"
        );
        Self {
            manifest: Arc::new(manifest),
            index: Arc::new(index),
            transport,
            store: Arc::new(InMemoryCredentialStore::new()),
            oauth: None,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Discover `domain` and bind the resulting manifest.
    pub async fn discover(domain: &str, config: ClientConfig) -> IaJsonResult<Self> {
        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::with_user_agent(&config.user_agent)?);
        Self::discover_with_transport(domain, config, transport).await
    }

    pub async fn discover_with_transport(
        domain: &str,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> IaJsonResult<Self> {
        let manifest = Discoverer::new(transport.clone(), &config)
            .discover(domain)
            .await?;
        Ok(Self::with_transport(manifest, config, transport))
    }

    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_oauth(mut self, flow: Arc<OAuthFlow>) -> Self {
        self.oauth = Some(flow);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn site(&self) -> &crate::manifest::SiteInfo {
        &self.manifest.site
    }

    pub fn base_url(&self) -> &str {
        &self.manifest.api.base_url
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    pub fn capabilities(&self) -> Option<&std::collections::BTreeMap<String, bool>> {
        self.manifest.capabilities.as_ref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn oauth(&self) -> Option<&Arc<OAuthFlow>> {
        self.oauth.as_ref()
    }

    /// Operations, optionally restricted to one tier.
    pub fn endpoints(&self, tier: Option<AccessTier>) -> Vec<&Operation> {
        self.index.list(tier)
    }

    pub fn endpoint(&self, name: &str) -> Result<&Operation, ValidationError> {
        self.index.resolve(name)
    }

    pub async fn set_credentials(&self, api_key: impl Into<String>, secret: impl Into<SecretString>) {
        self.store
            .set_key_credential(KeyCredential::new(api_key, secret))
            .await;
    }

    pub async fn set_access_token(&self, token: impl Into<SecretString>) {
        self.store.set_oauth_token(OAuthToken::bearer(token)).await;
    }

    /// Sign `body` with the stored credential at the current time.
    ///
    /// Returns `(signature, timestamp)`.
    pub async fn sign(&self, body: &str) -> IaJsonResult<(String, i64)> {
        let credential = self.signing_credential(None).await?;
        let (algorithm, prefix) = self.manifest.signing_settings();
        let headers = create_signed_headers_at(
            &credential.api_key,
            credential.secret.expose(),
            body,
            algorithm,
            prefix,
            self.clock.now_unix(),
        );
        Ok((headers.signature_value().to_string(), headers.timestamp_value()))
    }

    /// Invoke `name` with `params` (a JSON object, or null for none).
    pub async fn call(&self, name: &str, params: Value) -> IaJsonResult<Value> {
        let prepared = self.prepare_inner(name, params, None).await?;
        self.send(prepared).await
    }

    /// Like [`Dispatcher::call`] with an explicit bearer token for
    /// `user_required` operations.
    pub async fn call_with_token(
        &self,
        name: &str,
        params: Value,
        access_token: &str,
    ) -> IaJsonResult<Value> {
        let prepared = self.prepare_inner(name, params, Some(access_token)).await?;
        self.send(prepared).await
    }

    /// Build, authenticate and return the request without sending it.
    pub async fn prepare(&self, name: &str, params: Value) -> IaJsonResult<PreparedRequest> {
        self.prepare_inner(name, params, None).await
    }

    /// Registration step 1 against the site's `register_url`.
    pub async fn register_agent(&self, agent: &AgentInfo) -> IaJsonResult<Value> {
        let register_url = self.register_url()?;
        self.registrar().register(register_url, agent).await
    }

    /// Registration step 3. The credential is stored only on success.
    pub async fn complete_registration(
        &self,
        verification_code: &str,
        verify_url: Option<&str>,
    ) -> IaJsonResult<KeyCredential> {
        let verify_url = match verify_url {
            Some(url) => url.to_string(),
            None => default_verify_url(self.register_url()?)?,
        };
        let credential = self
            .registrar()
            .verify(&verify_url, verification_code)
            .await?;
        self.store.set_key_credential(credential.clone()).await;
        info!(site = %self.manifest.site.name, "signed-key credential stored");
        Ok(credential)
    }

    fn register_url(&self) -> IaJsonResult<&str> {
        self.manifest
            .signed_key()
            .map(|cfg| cfg.register_url.as_str())
            .ok_or_else(|| {
                IaJsonError::config(format!(
                    "site '{}' does not declare auth.signed_key",
                    self.manifest.site.name
                ))
            })
    }

    fn registrar(&self) -> Registrar {
        Registrar::new(self.transport.clone(), self.config.timeout())
    }

    async fn prepare_inner(
        &self,
        name: &str,
        params: Value,
        access_token: Option<&str>,
    ) -> IaJsonResult<PreparedRequest> {
        let operation = self.index.resolve(name)?;
        let params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(ValidationError::InvalidParameters.into()),
        };

        let routed = helpers::route_params(&self.manifest.api.base_url, operation, params)?;

        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if routed.body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        if operation.tier.requires_signature() {
            let credential = self.signing_credential(Some(operation)).await?;
            let (algorithm, prefix) = self.manifest.signing_settings();
            let signed = create_signed_headers_at(
                &credential.api_key,
                credential.secret.expose(),
                routed.body.as_deref().unwrap_or_default(),
                algorithm,
                prefix,
                self.clock.now_unix(),
            );
            headers.extend(signed.into_pairs());
        }

        if operation.tier.requires_user_token() {
            let token = match access_token {
                Some(token) if !token.is_empty() => token.to_string(),
                _ => self.bearer_token(operation).await?,
            };
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        Ok(PreparedRequest {
            operation: operation.name.clone(),
            tier: operation.tier,
            method: operation.method,
            url: routed.url,
            headers,
            body: routed.body,
        })
    }

    async fn signing_credential(&self, operation: Option<&Operation>) -> IaJsonResult<KeyCredential> {
        let target = operation.map_or_else(|| "signing".to_string(), |op| format!("'{}'", op.name));
        let credential = self
            .store
            .key_credential()
            .await
            .filter(KeyCredential::is_complete)
            .ok_or_else(|| {
                IaJsonError::auth(
                    AuthErrorKind::MissingCredentials,
                    format!("{target} requires signed-key credentials; register with the site first"),
                )
            })?;

        if credential.is_expired_at(self.clock.now_unix()) {
            return Err(IaJsonError::auth(
                AuthErrorKind::MissingCredentials,
                format!("{target} requires signed-key credentials; the stored credential has expired"),
            ));
        }
        Ok(credential)
    }

    async fn bearer_token(&self, operation: &Operation) -> IaJsonResult<String> {
        if let Some(flow) = &self.oauth {
            if flow.has_token().await {
                let token = flow.current_token().await?;
                return Ok(token.access_token.expose().to_string());
            }
        }

        match self.store.oauth_token().await {
            Some(token)
                if !token.access_token.is_empty()
                    && !token.is_expired_at(self.clock.now_unix()) =>
            {
                Ok(token.access_token.expose().to_string())
            }
            Some(_) => Err(IaJsonError::auth(
                AuthErrorKind::MissingOAuthToken,
                format!("'{}' requires a user token; the stored token has expired", operation.name),
            )),
            None => Err(IaJsonError::auth(
                AuthErrorKind::MissingOAuthToken,
                format!("'{}' requires a user token; complete the OAuth flow first", operation.name),
            )),
        }
    }

    async fn send(&self, prepared: PreparedRequest) -> IaJsonResult<Value> {
        debug!(
            operation = %prepared.operation,
            tier = %prepared.tier,
            method = %prepared.method,
            url = %prepared.url,
            "calling operation"
        );
        let request = prepared.into_http_request(&self.config);
        let response =
            http::send_checked(self.transport.as_ref(), request, http::map_error_response).await?;
        http::parse_json_body(&response)
    }
}
