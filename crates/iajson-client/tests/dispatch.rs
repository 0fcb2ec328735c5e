//! Integration tests for operation dispatch: routing, authentication and
//! status mapping.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{json_response, shop_manifest, MockTransport};
use iajson_client::{
    sign, verify_at, AuthErrorKind, ClientConfig, CredentialStore, Dispatcher, FixedClock,
    HmacAlgorithm, HttpMethod, HttpResponse, IaJsonError, InMemoryCredentialStore,
    KeyCredential, Manifest, OAuthToken, ValidationError,
};
use serde_json::json;

const NOW: i64 = 1_700_000_000;

fn dispatcher(transport: Arc<MockTransport>) -> Dispatcher {
    let manifest =
        Manifest::from_value(shop_manifest(), "https://shop.example/ia.json").expect("manifest");
    Dispatcher::with_transport(manifest, ClientConfig::default(), transport)
        .with_clock(Arc::new(FixedClock::new(NOW)))
}

async fn signed_dispatcher(transport: Arc<MockTransport>) -> Dispatcher {
    let client = dispatcher(transport);
    client.set_credentials("key_live_1", "s3cret").await;
    client
}

#[tokio::test]
async fn test_public_call_routes_query() {
    let transport = MockTransport::new();
    transport.on_json(
        HttpMethod::Get,
        "https://shop.example/api/products/search",
        200,
        json!({ "results": [{ "id": "p1" }] }),
    );

    let client = dispatcher(transport.clone());
    let result = client
        .call("search_products", json!({ "q": "coffee beans", "limit": 5 }))
        .await
        .expect("call failed");

    assert_eq!(result["results"][0]["id"], "p1");
    let request = transport.last_request();
    assert_eq!(request.method, HttpMethod::Get);
    assert_eq!(
        request.url,
        "https://shop.example/api/products/search?limit=5&q=coffee+beans"
    );
    assert!(request.body.is_none());
    assert!(request.header_value("X-IA-Signature").is_none());
    assert!(request.header_value("Authorization").is_none());
    assert_eq!(request.timeout, Duration::from_secs(30));
}

#[tokio::test]
async fn test_path_parameter_is_escaped() {
    let transport = MockTransport::new();
    transport.on_json(
        HttpMethod::Get,
        "https://shop.example/api/products/a%2Fb",
        200,
        json!({ "id": "a/b" }),
    );

    let client = dispatcher(transport.clone());
    let result = client
        .call("get_product", json!({ "id": "a/b" }))
        .await
        .expect("call failed");
    assert_eq!(result["id"], "a/b");
}

#[tokio::test]
async fn test_unknown_operation_sends_nothing() {
    let transport = MockTransport::new();
    let client = dispatcher(transport.clone());

    let err = client.call("drop_tables", json!({})).await.unwrap_err();
    match err {
        IaJsonError::Validation(ValidationError::UnknownOperation { name, available }) => {
            assert_eq!(name, "drop_tables");
            assert!(available.contains(&"get_orders".to_string()));
        }
        other => panic!("expected UnknownOperation, got {other:?}"),
    }
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_missing_path_parameter_sends_nothing() {
    let transport = MockTransport::new();
    let client = dispatcher(transport.clone());

    let err = client.call("get_product", json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        IaJsonError::Validation(ValidationError::MissingParameter { .. })
    ));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_dot_segment_path_parameter_sends_nothing() {
    let transport = MockTransport::new();
    let client = dispatcher(transport.clone());

    let err = client
        .call("get_product", json!({ "id": ".." }))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IaJsonError::Validation(ValidationError::InvalidPathSegment { .. })
    ));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_non_object_params_rejected() {
    let transport = MockTransport::new();
    let client = dispatcher(transport.clone());

    let err = client
        .call("search_products", json!(["coffee"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IaJsonError::Validation(ValidationError::InvalidParameters)
    ));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_protected_call_signs_exact_body() {
    let transport = MockTransport::new();
    transport.on_json(
        HttpMethod::Post,
        "https://shop.example/api/cart/items",
        201,
        json!({ "cart_id": "c1" }),
    );

    let client = signed_dispatcher(transport.clone()).await;
    let result = client
        .call("add_to_cart", json!({ "product_id": "p1", "quantity": 2 }))
        .await
        .expect("call failed");
    assert_eq!(result["cart_id"], "c1");

    let request = transport.last_request();
    let body = String::from_utf8(request.body.clone().expect("body")).unwrap();
    assert_eq!(body, r#"{"product_id":"p1","quantity":2}"#);
    assert_eq!(request.header_value("Content-Type"), Some("application/json"));
    assert_eq!(request.header_value("X-IA-Key"), Some("key_live_1"));
    assert_eq!(
        request.header_value("X-IA-Timestamp"),
        Some(NOW.to_string().as_str())
    );

    let signature = request.header_value("X-IA-Signature").expect("signature");
    assert_eq!(signature, sign("s3cret", NOW, &body, HmacAlgorithm::Sha256));
    verify_at(
        "s3cret",
        signature,
        NOW,
        &body,
        HmacAlgorithm::Sha256,
        60,
        NOW,
    )
    .expect("signature verifies");
}

#[tokio::test]
async fn test_delete_signs_empty_body() {
    let transport = MockTransport::new();
    transport.on(
        HttpMethod::Delete,
        "https://shop.example/api/cart/items/i1",
        HttpResponse::new(204, ""),
    );

    let client = signed_dispatcher(transport.clone()).await;
    let result = client
        .call("remove_from_cart", json!({ "item_id": "i1", "force": true }))
        .await
        .expect("call failed");
    assert_eq!(result, json!({}));

    let request = transport.last_request();
    assert_eq!(
        request.url,
        "https://shop.example/api/cart/items/i1?force=true"
    );
    assert!(request.body.is_none());
    assert_eq!(
        request.header_value("X-IA-Signature"),
        Some(sign("s3cret", NOW, "", HmacAlgorithm::Sha256).as_str())
    );
}

#[tokio::test]
async fn test_protected_without_credentials_fails_fast() {
    let transport = MockTransport::new();
    let client = dispatcher(transport.clone());

    let err = client
        .call("add_to_cart", json!({ "product_id": "p1" }))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::MissingCredentials));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_incomplete_or_expired_credentials_rejected() {
    let transport = MockTransport::new();
    let client = dispatcher(transport.clone());
    client.set_credentials("key_live_1", "").await;

    let err = client.prepare("add_to_cart", json!({})).await.unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::MissingCredentials));

    let expired = KeyCredential {
        expires_at: chrono::DateTime::from_timestamp(NOW - 1, 0),
        ..KeyCredential::new("key_live_1", "s3cret")
    };
    let client = dispatcher(transport.clone()).with_credential_store(Arc::new(
        InMemoryCredentialStore::with_key_credential(expired),
    ));
    let err = client.prepare("add_to_cart", json!({})).await.unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::MissingCredentials));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_user_required_needs_token() {
    let transport = MockTransport::new();
    let client = signed_dispatcher(transport.clone()).await;

    let err = client
        .call("get_orders", json!({ "user_id": "u1" }))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::MissingOAuthToken));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_user_required_sends_bearer_and_signature() {
    let transport = MockTransport::new();
    transport.on_json(
        HttpMethod::Get,
        "https://shop.example/api/users/u1/orders",
        200,
        json!({ "orders": [] }),
    );

    let client = signed_dispatcher(transport.clone()).await;
    client.set_access_token("user-token").await;
    client
        .call("get_orders", json!({ "user_id": "u1" }))
        .await
        .expect("call failed");

    let request = transport.last_request();
    assert_eq!(request.header_value("Authorization"), Some("Bearer user-token"));
    assert!(request.header_value("X-IA-Signature").is_some());
}

#[tokio::test]
async fn test_call_with_token_overrides_store() {
    let transport = MockTransport::new();
    transport.on_json(
        HttpMethod::Get,
        "https://shop.example/api/users/u1/orders",
        200,
        json!({ "orders": [] }),
    );

    let client = signed_dispatcher(transport.clone()).await;
    client
        .call_with_token("get_orders", json!({ "user_id": "u1" }), "explicit")
        .await
        .expect("call failed");

    assert_eq!(
        transport.last_request().header_value("Authorization"),
        Some("Bearer explicit")
    );
}

#[tokio::test]
async fn test_expired_store_token_rejected() {
    let transport = MockTransport::new();
    let client = signed_dispatcher(transport.clone()).await;
    client
        .credential_store()
        .set_oauth_token(OAuthToken {
            expires_at: Some(NOW + 10),
            ..OAuthToken::bearer("stale")
        })
        .await;

    let err = client
        .call("get_orders", json!({ "user_id": "u1" }))
        .await
        .unwrap_err();
    assert_eq!(err.auth_kind(), Some(AuthErrorKind::MissingOAuthToken));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_rate_limited() {
    let transport = MockTransport::new();
    transport.on(
        HttpMethod::Get,
        "https://shop.example/api/products/search",
        HttpResponse::new(429, "").with_header("Retry-After", "30"),
    );

    let client = dispatcher(transport.clone());
    let err = client
        .call("search_products", json!({ "q": "tea" }))
        .await
        .unwrap_err();

    match err {
        IaJsonError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(Duration::from_secs(30)))
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    // exactly one attempt
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_server_rejects_signature() {
    let transport = MockTransport::new();
    transport.on(
        HttpMethod::Post,
        "https://shop.example/api/cart/items",
        json_response(
            401,
            json!({ "error": { "code": "expired_timestamp", "message": "stale request" } }),
        ),
    );

    let client = signed_dispatcher(transport).await;
    let err = client
        .call("add_to_cart", json!({ "product_id": "p1" }))
        .await
        .unwrap_err();

    assert_eq!(err.auth_kind(), Some(AuthErrorKind::ExpiredTimestamp));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_protocol_error() {
    let transport = MockTransport::new();
    transport.on(
        HttpMethod::Get,
        "https://shop.example/api/products/search",
        json_response(
            503,
            json!({ "error": { "code": "maintenance", "message": "back soon", "details": { "eta": 60 } } }),
        ),
    );

    let client = dispatcher(transport);
    let err = client
        .call("search_products", json!({ "q": "tea" }))
        .await
        .unwrap_err();

    match &err {
        IaJsonError::Protocol {
            status,
            code,
            message,
            details,
        } => {
            assert_eq!(*status, 503);
            assert_eq!(code.as_deref(), Some("maintenance"));
            assert_eq!(message, "back soon");
            assert_eq!(details["eta"], 60);
        }
        other => panic!("expected Protocol, got {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_non_json_success_is_invalid_response() {
    let transport = MockTransport::new();
    transport.on(
        HttpMethod::Get,
        "https://shop.example/api/products/search",
        HttpResponse::new(200, "<html>ok</html>"),
    );

    let err = dispatcher(transport)
        .call("search_products", json!({ "q": "tea" }))
        .await
        .unwrap_err();
    assert!(matches!(err, IaJsonError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_prepare_and_sign_helpers() {
    let transport = MockTransport::new();
    let client = signed_dispatcher(transport.clone()).await;

    let prepared = client
        .prepare("add_to_cart", json!({ "product_id": "p1" }))
        .await
        .expect("prepare");
    assert_eq!(prepared.url, "https://shop.example/api/cart/items");
    assert_eq!(prepared.body.as_deref(), Some(r#"{"product_id":"p1"}"#));
    assert_eq!(prepared.header("x-ia-key"), Some("key_live_1"));

    let (signature, timestamp) = client.sign(r#"{"a":1}"#).await.expect("sign");
    assert_eq!(timestamp, NOW);
    assert_eq!(
        signature,
        sign("s3cret", NOW, r#"{"a":1}"#, HmacAlgorithm::Sha256)
    );
    assert_eq!(transport.request_count(), 0);
}
