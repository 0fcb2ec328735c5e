//! Agent registration for signed-key sites.
//!
//! Registration is a three-step handshake:
//!
//! 1. `register` posts the agent's identity to the site's `register_url`.
//! 2. The site delivers a verification code to the agent's webhook
//!    ([`VerificationNotice`]); receiving it is the application's job.
//! 3. `verify` exchanges that code for a [`KeyCredential`].
//!
//! Nothing is persisted here. The dispatcher stores the credential only after
//! step 3 yields both an API key and a secret.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::http::{map_error_response, parse_json_body, send_checked};
use crate::credentials::KeyCredential;
use crate::error::{IaJsonError, IaJsonResult, ValidationError};
use crate::transport::{HttpMethod, HttpRequest, Transport};

/// Identity an agent presents when registering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub domain: String,
    pub webhook_url: String,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AgentInfo {
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        webhook_url: impl Into<String>,
        contact: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            webhook_url: webhook_url.into(),
            contact: contact.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Every identity field must be non-blank and the webhook must be a URL.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("name", &self.name),
            ("domain", &self.domain),
            ("webhook_url", &self.webhook_url),
            ("contact", &self.contact),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ValidationError::InvalidRegistration {
                reason: format!("{field} is required"),
            });
        }
        if url::Url::parse(&self.webhook_url).is_err() {
            return Err(ValidationError::InvalidRegistration {
                reason: format!("webhook_url is not a valid URL: {}", self.webhook_url),
            });
        }
        Ok(())
    }
}

/// Payload the site posts to the agent's webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationNotice {
    pub verification_code: String,
    #[serde(default)]
    pub site: Option<Value>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl VerificationNotice {
    pub fn from_slice(bytes: &[u8]) -> IaJsonResult<Self> {
        let notice: Self = serde_json::from_slice(bytes).map_err(|e| {
            IaJsonError::invalid_response(format!("malformed verification notice: {e}"))
        })?;
        if notice.verification_code.is_empty() {
            return Err(IaJsonError::invalid_response(
                "verification notice has an empty code",
            ));
        }
        Ok(notice)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp.timestamp())
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    secret: Option<String>,
    #[serde(default)]
    expires_at: Option<Value>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
}

/// Accepts RFC 3339, a bare `YYYY-MM-DD` date, or Unix seconds. Anything else
/// is dropped: the verification code is already spent by the time this runs.
fn parse_expires_at(raw: &Value) -> Option<DateTime<Utc>> {
    let parsed = match raw {
        Value::Null => return None,
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
            }),
        _ => None,
    };
    if parsed.is_none() {
        warn!(expires_at = %raw, "ignoring unparseable credential expiry");
    }
    parsed
}

/// Derive the verification URL from the registration URL by replacing its
/// last path segment: `https://s/api/ia/register` becomes `https://s/api/ia/verify`.
pub fn default_verify_url(register_url: &str) -> IaJsonResult<String> {
    let mut url = url::Url::parse(register_url)
        .map_err(|e| IaJsonError::config(format!("invalid register_url {register_url}: {e}")))?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            IaJsonError::config(format!("register_url has no path: {register_url}"))
        })?;
        segments.pop_if_empty().pop().push("verify");
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Performs the registration and verification calls.
#[derive(Debug, Clone)]
pub struct Registrar {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Registrar {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Step 1: announce the agent. Returns the site's acknowledgement.
    pub async fn register(&self, register_url: &str, agent: &AgentInfo) -> IaJsonResult<Value> {
        agent.validate()?;

        let body = serde_json::to_value(agent)
            .map_err(|e| IaJsonError::config(format!("cannot encode agent info: {e}")))?;
        let request = HttpRequest::new(HttpMethod::Post, register_url, self.timeout)
            .header("Accept", "application/json")
            .json_body(&body);

        debug!(url = %register_url, agent = %agent.name, "registering agent");
        let response = send_checked(self.transport.as_ref(), request, map_error_response).await?;
        let ack = parse_json_body(&response)?;
        info!(url = %register_url, agent = %agent.name, "registration submitted; awaiting verification code");
        Ok(ack)
    }

    /// Step 3: exchange the webhook-delivered code for a credential.
    pub async fn verify(&self, verify_url: &str, code: &str) -> IaJsonResult<KeyCredential> {
        if code.trim().is_empty() {
            return Err(ValidationError::InvalidRegistration {
                reason: "verification code is empty".to_string(),
            }
            .into());
        }

        let request = HttpRequest::new(HttpMethod::Post, verify_url, self.timeout)
            .header("Accept", "application/json")
            .json_body(&json!({ "verification_code": code }));

        let response = send_checked(self.transport.as_ref(), request, map_error_response).await?;
        let parsed: VerifyResponse = serde_json::from_slice(&response.body).map_err(|e| {
            IaJsonError::invalid_response(format!("malformed verification response: {e}"))
        })?;

        let api_key = parsed.api_key.filter(|k| !k.is_empty());
        let secret = parsed.secret.filter(|s| !s.is_empty());
        let (Some(api_key), Some(secret)) = (api_key, secret) else {
            return Err(IaJsonError::invalid_response(
                "verification response is missing api_key or secret",
            ));
        };

        let permissions = parsed.permissions.unwrap_or_default();
        info!(
            url = %verify_url,
            permissions = permissions.len(),
            "agent verified"
        );
        Ok(KeyCredential {
            api_key,
            secret: secret.into(),
            expires_at: parsed.expires_at.as_ref().and_then(parse_expires_at),
            permissions,
        })
    }
}
