//! Client-side protocol engine for ia.json sites.
//!
//! A site publishes an `ia.json` manifest describing its API. This crate
//! provides:
//!
//! - Manifest discovery and validation
//! - An operation index keyed by name, with access tiers
//! - Request dispatch with path/query/body routing
//! - HMAC request signing and verification for signed-key auth
//! - Agent registration and verification
//! - OAuth2 authorization code (PKCE), refresh and client-credentials grants
//!
//! # Quick Start
//!
//! ```no_run
//! use iajson_client::{ClientConfig, Dispatcher};
//! use serde_json::json;
//!
//! # async fn example() -> iajson_client::IaJsonResult<()> {
//! let client = Dispatcher::discover("shop.example", ClientConfig::from_env()).await?;
//!
//! // Public operations need no credentials
//! let results = client
//!     .call("search_products", json!({ "q": "coffee", "limit": 5 }))
//!     .await?;
//! println!("{}", results);
//!
//! // Protected operations are signed with a stored key credential
//! client.set_credentials("key_live_1", "secret").await;
//! client
//!     .call("add_to_cart", json!({ "product_id": "p1", "quantity": 1 }))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Authentication
//!
//! | Tier | Requirement |
//! |------|-------------|
//! | `public` | none |
//! | `protected` | signed-key credential (`{prefix}Key`, `{prefix}Signature`, `{prefix}Timestamp`) |
//! | `user_required` | signed-key credential plus an OAuth2 bearer token |
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `IAJSON_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `IAJSON_DISCOVERY_TIMEOUT` | Per-location discovery timeout in seconds (default: 10) |
//! | `IAJSON_USER_AGENT` | User-Agent header |
//! | `IAJSON_REPLAY_WINDOW` | Signature replay window in seconds (default: 60) |
//! | `IAJSON_API_KEY` / `IAJSON_SECRET` | Signed-key credential ([`InMemoryCredentialStore::from_env`]) |
//! | `IAJSON_ACCESS_TOKEN` | OAuth2 bearer token ([`InMemoryCredentialStore::from_env`]) |

pub mod client;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod manifest;
pub mod oauth;
pub mod register;
pub mod signer;
pub mod transport;

// Re-export main types
pub use client::{Dispatcher, PreparedRequest};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ClientConfig, MAX_MANIFEST_BYTES};
pub use credentials::{
    CredentialStore, InMemoryCredentialStore, KeyCredential, OAuthToken, SecretString,
};
pub use discovery::{discovery_urls, normalize_domain, Discoverer, DISCOVERY_PATHS};
pub use endpoints::{EndpointIndex, Operation};
pub use error::{AuthErrorKind, DiscoveryError, IaJsonError, IaJsonResult, ValidationError};
pub use manifest::{
    AccessTier, ApiSection, AuthSection, EndpointSpec, Manifest, OAuth2Config, ParameterSpec,
    SignedKeyConfig, SiteInfo, SUPPORTED_MAJOR_VERSION,
};
pub use oauth::{
    build_authorization_url, generate_state, AuthorizationRequest, OAuthFlow, PkceChallenge,
};
pub use register::{default_verify_url, AgentInfo, Registrar, VerificationNotice};
pub use signer::{
    create_signed_headers, create_signed_headers_at, sign, signing_string, verify, verify_at,
    verify_with_clock, HmacAlgorithm, SignedHeaders, DEFAULT_MAX_AGE_SECS,
};
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError,
    USER_AGENT_VALUE,
};
