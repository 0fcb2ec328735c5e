//! HMAC request signing for signed-key authentication.
//!
//! The signing string is the literal `"{timestamp}.{body}"`. A request
//! without a body signs `"{timestamp}."` (trailing dot, empty segment).
//! The signature is the lowercase hex HMAC digest.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};

use crate::clock::{Clock, SystemClock};
use crate::error::{AuthErrorKind, IaJsonError, IaJsonResult};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Default replay window for [`verify`].
pub const DEFAULT_MAX_AGE_SECS: u64 = 60;

/// HMAC digest algorithm declared in `auth.signed_key.algorithm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmacAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HmacAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for HmacAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HmacAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(format!("unsupported HMAC algorithm: {other}")),
        }
    }
}

/// The exact bytes that get signed.
pub fn signing_string(timestamp: i64, body: &str) -> String {
    format!("{}.{}", timestamp, body)
}

/// Compute the hex signature for `body` at `timestamp`.
pub fn sign(secret: &str, timestamp: i64, body: &str, algorithm: HmacAlgorithm) -> String {
    let message = signing_string(timestamp, body);
    match algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .expect("HMAC can take key of any size");
            mac.update(message.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        HmacAlgorithm::Sha512 => {
            let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
                .expect("HMAC can take key of any size");
            mac.update(message.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

/// Check freshness and signature, reporting which check failed.
///
/// Freshness (`|now - timestamp| <= max_age_secs`) is checked before any
/// HMAC work. The digest comparison is constant-time.
pub fn verify_at(
    secret: &str,
    provided_signature: &str,
    timestamp: i64,
    body: &str,
    algorithm: HmacAlgorithm,
    max_age_secs: u64,
    now: i64,
) -> IaJsonResult<()> {
    if now.abs_diff(timestamp) > max_age_secs {
        return Err(IaJsonError::auth(
            AuthErrorKind::ExpiredTimestamp,
            format!("timestamp {} outside {}s window", timestamp, max_age_secs),
        ));
    }

    let provided = hex::decode(provided_signature.trim()).map_err(|_| {
        IaJsonError::auth(AuthErrorKind::InvalidSignature, "signature is not hex")
    })?;

    let message = signing_string(timestamp, body);
    let matches = match algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .expect("HMAC can take key of any size");
            mac.update(message.as_bytes());
            mac.verify_slice(&provided).is_ok()
        }
        HmacAlgorithm::Sha512 => {
            let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
                .expect("HMAC can take key of any size");
            mac.update(message.as_bytes());
            mac.verify_slice(&provided).is_ok()
        }
    };

    if matches {
        Ok(())
    } else {
        Err(IaJsonError::auth(
            AuthErrorKind::InvalidSignature,
            "signature mismatch",
        ))
    }
}

/// [`verify_at`] against a clock.
pub fn verify_with_clock(
    secret: &str,
    provided_signature: &str,
    timestamp: i64,
    body: &str,
    algorithm: HmacAlgorithm,
    max_age_secs: u64,
    clock: &dyn Clock,
) -> IaJsonResult<()> {
    verify_at(
        secret,
        provided_signature,
        timestamp,
        body,
        algorithm,
        max_age_secs,
        clock.now_unix(),
    )
}

/// `true` when the timestamp is fresh and the signature matches.
pub fn verify(
    secret: &str,
    provided_signature: &str,
    timestamp: i64,
    body: &str,
    algorithm: HmacAlgorithm,
    max_age_secs: u64,
) -> bool {
    verify_with_clock(
        secret,
        provided_signature,
        timestamp,
        body,
        algorithm,
        max_age_secs,
        &SystemClock,
    )
    .is_ok()
}

/// The three signed-key headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub key: (String, String),
    pub signature: (String, String),
    pub timestamp: (String, String),
}

impl SignedHeaders {
    pub fn timestamp_value(&self) -> i64 {
        self.timestamp.1.parse().unwrap_or_default()
    }

    pub fn signature_value(&self) -> &str {
        &self.signature.1
    }

    pub fn into_pairs(self) -> [(String, String); 3] {
        [self.key, self.signature, self.timestamp]
    }
}

/// Build `{prefix}Key`, `{prefix}Signature`, `{prefix}Timestamp` at an explicit timestamp.
pub fn create_signed_headers_at(
    api_key: &str,
    secret: &str,
    body: &str,
    algorithm: HmacAlgorithm,
    prefix: &str,
    timestamp: i64,
) -> SignedHeaders {
    let signature = sign(secret, timestamp, body, algorithm);
    SignedHeaders {
        key: (format!("{prefix}Key"), api_key.to_string()),
        signature: (format!("{prefix}Signature"), signature),
        timestamp: (format!("{prefix}Timestamp"), timestamp.to_string()),
    }
}

/// Build the signed headers at the current wall-clock time.
pub fn create_signed_headers(
    api_key: &str,
    secret: &str,
    body: &str,
    algorithm: HmacAlgorithm,
    prefix: &str,
) -> SignedHeaders {
    create_signed_headers_at(
        api_key,
        secret,
        body,
        algorithm,
        prefix,
        SystemClock.now_unix(),
    )
}
