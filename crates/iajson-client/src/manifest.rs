//! ia.json manifest types and structural validation.
//!
//! A [`Manifest`] is only produced by [`Manifest::from_slice`] /
//! [`Manifest::from_value`], which run the structural checks first. Code
//! holding a `Manifest` never re-checks its shape.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::DiscoveryError;
use crate::signer::HmacAlgorithm;
use crate::transport::HttpMethod;

/// The only manifest major version this client understands.
pub const SUPPORTED_MAJOR_VERSION: u64 = 1;

/// Default signed-key header prefix.
pub const DEFAULT_HEADER_PREFIX: &str = "X-IA-";

/// Access tier of an endpoint, in increasing order of required authentication.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    Public,
    Protected,
    UserRequired,
}

impl AccessTier {
    /// Index iteration order.
    pub const ALL: [AccessTier; 3] = [Self::Public, Self::Protected, Self::UserRequired];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::UserRequired => "user_required",
        }
    }

    /// Protected and user-required calls carry signed-key headers.
    pub fn requires_signature(&self) -> bool {
        !matches!(self, Self::Public)
    }

    pub fn requires_user_token(&self) -> bool {
        matches!(self, Self::UserRequired)
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccessTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "protected" => Ok(Self::Protected),
            "user_required" | "user-required" => Ok(Self::UserRequired),
            other => Err(format!("unknown access tier: {other}")),
        }
    }
}

/// A discovered, structurally valid manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Declared protocol version (`MAJOR.MINOR.PATCH`).
    pub version: String,

    pub site: SiteInfo,

    pub api: ApiSection,

    #[serde(default)]
    pub auth: Option<AuthSection>,

    #[serde(default)]
    pub security: Option<Value>,

    #[serde(default)]
    pub capabilities: Option<BTreeMap<String, bool>>,

    #[serde(default)]
    pub webhooks: Option<Value>,

    #[serde(default)]
    pub metadata: Option<Value>,
}

/// `site` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    pub name: String,

    #[serde(rename = "type")]
    pub site_type: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub logo: Option<String>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub contact: Option<String>,
}

/// `api` section: base URL plus one endpoint group per access tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    pub base_url: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub public: BTreeMap<String, EndpointSpec>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub protected: BTreeMap<String, EndpointSpec>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub user_required: BTreeMap<String, EndpointSpec>,
}

impl ApiSection {
    pub fn group(&self, tier: AccessTier) -> &BTreeMap<String, EndpointSpec> {
        match tier {
            AccessTier::Public => &self.public,
            AccessTier::Protected => &self.protected,
            AccessTier::UserRequired => &self.user_required,
        }
    }
}

/// `null` reads the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single endpoint declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub method: HttpMethod,

    /// Path template, e.g. `/products/{id}`.
    pub path: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: BTreeMap<String, ParameterSpec>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub body: BTreeMap<String, ParameterSpec>,

    /// Advertised rate limit, e.g. `"60/minute"`.
    #[serde(default)]
    pub rate_limit: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub scopes: Vec<String>,

    #[serde(default)]
    pub deprecated: bool,
}

/// Parameter or body field declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub default: Option<Value>,

    #[serde(default)]
    pub example: Option<Value>,

    #[serde(rename = "enum", default)]
    pub allowed_values: Option<Vec<Value>>,

    #[serde(default)]
    pub min: Option<f64>,

    #[serde(default)]
    pub max: Option<f64>,

    #[serde(default)]
    pub pattern: Option<String>,
}

fn default_param_type() -> String {
    "string".to_string()
}

/// `auth` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub signed_key: Option<SignedKeyConfig>,

    #[serde(default)]
    pub oauth2: Option<OAuth2Config>,
}

/// `auth.signed_key` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedKeyConfig {
    pub register_url: String,

    #[serde(default)]
    pub algorithm: HmacAlgorithm,

    #[serde(default = "default_header_prefix")]
    pub header_prefix: String,
}

fn default_header_prefix() -> String {
    DEFAULT_HEADER_PREFIX.to_string()
}

/// `auth.oauth2` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    pub authorization_url: String,

    pub token_url: String,

    /// Scope name to human description.
    #[serde(default)]
    pub scopes: BTreeMap<String, String>,

    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<String>,

    #[serde(default)]
    pub pkce_required: bool,
}

fn default_grant_types() -> Vec<String> {
    vec!["authorization_code".to_string()]
}

impl OAuth2Config {
    pub fn supports_grant(&self, grant: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant)
    }
}

impl Manifest {
    /// Parse and validate raw manifest bytes fetched from `url`.
    pub fn from_slice(bytes: &[u8], url: &str) -> Result<Self, DiscoveryError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DiscoveryError::InvalidFormat {
                url: url.to_string(),
                reason: format!("not valid JSON: {}", e),
            })?;
        Self::from_value(value, url)
    }

    /// Validate an already-parsed document.
    pub fn from_value(value: Value, url: &str) -> Result<Self, DiscoveryError> {
        validate_document(&value, url)?;
        serde_json::from_value(value).map_err(|e| DiscoveryError::InvalidFormat {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Declared major version.
    pub fn major_version(&self) -> u64 {
        parse_version(&self.version)
            .map(|(major, _, _)| major)
            .unwrap_or(SUPPORTED_MAJOR_VERSION)
    }

    pub fn signed_key(&self) -> Option<&SignedKeyConfig> {
        self.auth.as_ref().and_then(|a| a.signed_key.as_ref())
    }

    pub fn oauth2(&self) -> Option<&OAuth2Config> {
        self.auth.as_ref().and_then(|a| a.oauth2.as_ref())
    }

    /// Whether a capability flag is declared and set.
    pub fn capability(&self, name: &str) -> bool {
        self.capabilities
            .as_ref()
            .and_then(|c| c.get(name).copied())
            .unwrap_or(false)
    }

    /// Signing algorithm and header prefix; defaults when the site declares no signed-key section.
    pub fn signing_settings(&self) -> (HmacAlgorithm, &str) {
        match self.signed_key() {
            Some(cfg) => (cfg.algorithm, cfg.header_prefix.as_str()),
            None => (HmacAlgorithm::default(), DEFAULT_HEADER_PREFIX),
        }
    }
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("static regex"))
}

fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let caps = version_regex().captures(version)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps.get(3)?.as_str().parse().ok()?;
    Some((major, minor, patch))
}

/// Structural checks a manifest must pass before anything trusts it.
fn validate_document(value: &Value, url: &str) -> Result<(), DiscoveryError> {
    let invalid = |reason: String| DiscoveryError::InvalidFormat {
        url: url.to_string(),
        reason,
    };

    let doc = value
        .as_object()
        .ok_or_else(|| invalid("top-level value is not a JSON object".into()))?;

    let version = doc
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing required field 'version'".into()))?;
    let (major, _, _) = parse_version(version)
        .ok_or_else(|| invalid(format!("version '{}' is not MAJOR.MINOR.PATCH", version)))?;
    if major != SUPPORTED_MAJOR_VERSION {
        return Err(DiscoveryError::UnsupportedVersion {
            version: version.to_string(),
            supported: SUPPORTED_MAJOR_VERSION,
        });
    }

    let site = doc
        .get("site")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("missing required field 'site'".into()))?;
    for key in ["name", "type"] {
        let present = site
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !present {
            return Err(invalid(format!("missing required field 'site.{}'", key)));
        }
    }

    let api = doc
        .get("api")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("missing required field 'api'".into()))?;
    let base_url = api
        .get("base_url")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing required field 'api.base_url'".into()))?;
    let parsed = url::Url::parse(base_url)
        .map_err(|e| invalid(format!("api.base_url '{}' is not a URL: {}", base_url, e)))?;
    if parsed.scheme() != "https" {
        return Err(invalid(format!(
            "api.base_url '{}' must use https://",
            base_url
        )));
    }

    let has_endpoints = AccessTier::ALL.iter().any(|tier| {
        api.get(tier.as_str())
            .and_then(Value::as_object)
            .is_some_and(|group| !group.is_empty())
    });
    if !has_endpoints {
        return Err(invalid(
            "api declares no endpoints (public, protected, user_required all empty)".into(),
        ));
    }

    Ok(())
}
