//! HTTP layer: status mapping and response decoding.
//!
//! This is the ONLY place API status codes are interpreted. The dispatcher,
//! registrar and OAuth flow hand every non-2xx response to a mapper here.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::{AuthErrorKind, IaJsonError, IaJsonResult};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Parsed server error body.
///
/// Accepts the protocol shape `{"error": {"code", "message", "details"}}`
/// and the OAuth2 shape `{"error": "...", "error_description": "..."}`.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Value,
}

pub(crate) fn parse_error_body(body: &[u8]) -> ErrorBody {
    let Ok(json) = serde_json::from_slice::<Value>(body) else {
        return ErrorBody::default();
    };

    match json.get("error") {
        Some(Value::Object(err)) => ErrorBody {
            code: err.get("code").and_then(Value::as_str).map(String::from),
            message: err.get("message").and_then(Value::as_str).map(String::from),
            details: err.get("details").cloned().unwrap_or(Value::Null),
        },
        Some(Value::String(code)) => ErrorBody {
            code: Some(code.clone()),
            message: json
                .get("error_description")
                .and_then(Value::as_str)
                .map(String::from),
            details: Value::Null,
        },
        _ => ErrorBody::default(),
    }
}

fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn fallback_message(response: &HttpResponse) -> String {
    let text = response.text();
    if text.trim().is_empty() {
        format!("HTTP {}", response.status)
    } else {
        text.chars().take(200).collect()
    }
}

/// Map a non-2xx response onto the error taxonomy.
pub(crate) fn map_error_response(response: &HttpResponse) -> IaJsonError {
    let status = response.status;

    if status == 429 {
        return IaJsonError::RateLimited {
            retry_after: retry_after(response),
        };
    }

    let body = parse_error_body(&response.body);
    let message = body
        .message
        .clone()
        .unwrap_or_else(|| fallback_message(response));

    match status {
        401 | 403 => IaJsonError::Authentication {
            kind: body
                .code
                .as_deref()
                .map(AuthErrorKind::from_code)
                .unwrap_or(AuthErrorKind::Rejected),
            code: body.code,
            status: Some(status),
            message,
        },
        _ => IaJsonError::Protocol {
            status,
            code: body.code,
            message,
            details: body.details,
        },
    }
}

/// Map a token endpoint failure. Grant rejections (400/401/403) are
/// authentication failures rather than protocol errors.
pub(crate) fn map_token_error(response: &HttpResponse) -> IaJsonError {
    match response.status {
        400 | 401 | 403 => {
            let body = parse_error_body(&response.body);
            let message = body
                .message
                .clone()
                .or_else(|| body.code.clone())
                .unwrap_or_else(|| fallback_message(response));
            IaJsonError::Authentication {
                kind: AuthErrorKind::TokenRejected,
                code: body.code,
                status: Some(response.status),
                message,
            }
        }
        _ => map_error_response(response),
    }
}

/// Decode a 2xx body as JSON; an empty body is an empty object.
pub(crate) fn parse_json_body(response: &HttpResponse) -> IaJsonResult<Value> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(&response.body).map_err(|e| {
        IaJsonError::invalid_response(format!(
            "HTTP {} body is not JSON: {}",
            response.status, e
        ))
    })
}

/// Send once; 2xx passes through, anything else is mapped with `map_err`.
pub(crate) async fn send_checked(
    transport: &dyn Transport,
    request: HttpRequest,
    map_err: fn(&HttpResponse) -> IaJsonError,
) -> IaJsonResult<HttpResponse> {
    let method = request.method;
    let url = request.url.clone();
    let response = transport.send(request).await?;
    debug!(method = %method, url = %url, status = response.status, "response received");

    if response.is_success() {
        Ok(response)
    } else {
        Err(map_err(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_response(status: u16, body: Value) -> HttpResponse {
        HttpResponse::new(status, body.to_string())
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let resp = HttpResponse::new(429, "slow down").with_header("Retry-After", "12");
        match map_error_response(&resp) {
            IaJsonError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(12)))
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        let resp = HttpResponse::new(429, "");
        assert!(matches!(
            map_error_response(&resp),
            IaJsonError::RateLimited { retry_after: None }
        ));
    }

    #[test]
    fn test_auth_failure_carries_code() {
        let resp = json_response(
            401,
            json!({"error": {"code": "invalid_signature", "message": "bad sig", "details": {}}}),
        );
        match map_error_response(&resp) {
            IaJsonError::Authentication {
                kind,
                code,
                status,
                message,
            } => {
                assert_eq!(kind, AuthErrorKind::InvalidSignature);
                assert_eq!(code.as_deref(), Some("invalid_signature"));
                assert_eq!(status, Some(401));
                assert_eq!(message, "bad sig");
            }
            other => panic!("expected Authentication, got {other:?}"),
        }
    }

    #[test]
    fn test_forbidden_without_body() {
        let resp = HttpResponse::new(403, "");
        match map_error_response(&resp) {
            IaJsonError::Authentication {
                kind, code, message, ..
            } => {
                assert_eq!(kind, AuthErrorKind::Rejected);
                assert!(code.is_none());
                assert_eq!(message, "HTTP 403");
            }
            other => panic!("expected Authentication, got {other:?}"),
        }
    }

    #[test]
    fn test_generic_protocol_error() {
        let resp = json_response(
            422,
            json!({"error": {"code": "invalid_quantity", "message": "quantity must be > 0", "details": {"field": "quantity"}}}),
        );
        match map_error_response(&resp) {
            IaJsonError::Protocol {
                status,
                code,
                details,
                ..
            } => {
                assert_eq!(status, 422);
                assert_eq!(code.as_deref(), Some("invalid_quantity"));
                assert_eq!(details["field"], "quantity");
            }
            other => panic!("expected Protocol, got {other:?}"),
        }

        let resp = HttpResponse::new(502, "<html>bad gateway</html>");
        match map_error_response(&resp) {
            IaJsonError::Protocol { message, code, .. } => {
                assert!(code.is_none());
                assert!(message.contains("bad gateway"));
            }
            other => panic!("expected Protocol, got {other:?}"),
        }
    }

    #[test]
    fn test_oauth_error_shape() {
        let resp = json_response(
            400,
            json!({"error": "invalid_grant", "error_description": "code expired"}),
        );
        match map_token_error(&resp) {
            IaJsonError::Authentication {
                kind, code, message, ..
            } => {
                assert_eq!(kind, AuthErrorKind::TokenRejected);
                assert_eq!(code.as_deref(), Some("invalid_grant"));
                assert_eq!(message, "code expired");
            }
            other => panic!("expected Authentication, got {other:?}"),
        }

        let resp = HttpResponse::new(500, "boom");
        assert!(matches!(
            map_token_error(&resp),
            IaJsonError::Protocol { status: 500, .. }
        ));
    }

    #[test]
    fn test_parse_json_body() {
        let resp = HttpResponse::new(200, "");
        assert_eq!(parse_json_body(&resp).unwrap(), json!({}));

        let resp = HttpResponse::new(200, r#"{"items":[1,2]}"#);
        assert_eq!(parse_json_body(&resp).unwrap()["items"][1], 2);

        let resp = HttpResponse::new(200, "not json");
        assert!(matches!(
            parse_json_body(&resp),
            Err(IaJsonError::InvalidResponse { .. })
        ));
    }
}
