//! Integration tests for the reqwest-backed transport.

use std::time::Duration;

use iajson_client::{
    HttpMethod, HttpRequest, ReqwestTransport, Transport, TransportError, USER_AGENT_VALUE,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn get(mock_server: &MockServer, route: &str) -> HttpRequest {
    HttpRequest::new(
        HttpMethod::Get,
        format!("{}{}", mock_server.uri(), route),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_send_returns_status_headers_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ia.json"))
        .and(header("user-agent", USER_AGENT_VALUE))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .insert_header("X-Request-Id", "abc"),
        )
        .mount(&mock_server)
        .await;

    let transport = ReqwestTransport::new().unwrap();
    let response = transport
        .send(get(&mock_server, "/ia.json").header("Accept", "application/json"))
        .await
        .expect("send failed");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"{}");
    assert_eq!(response.header("x-request-id"), Some("abc"));
}

#[tokio::test]
async fn test_error_status_is_not_a_transport_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&mock_server)
        .await;

    let response = ReqwestTransport::new()
        .unwrap()
        .send(get(&mock_server, "/anything"))
        .await
        .expect("send failed");
    assert_eq!(response.status, 503);
    assert_eq!(response.text(), "down");
}

#[tokio::test]
async fn test_body_limit_enforced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ia.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&mock_server)
        .await;

    let err = ReqwestTransport::new()
        .unwrap()
        .send(get(&mock_server, "/ia.json").max_body_bytes(1024))
        .await
        .unwrap_err();

    match err {
        TransportError::BodyTooLarge { limit, .. } => assert_eq!(limit, 1024),
        other => panic!("expected BodyTooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let mut request = get(&mock_server, "/slow");
    request.timeout = Duration::from_millis(100);
    let err = ReqwestTransport::new()
        .unwrap()
        .send(request)
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Timeout { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_custom_user_agent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("user-agent", "shopbot/2.0"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = ReqwestTransport::with_user_agent("shopbot/2.0")
        .unwrap()
        .send(get(&mock_server, "/"))
        .await
        .unwrap();
    assert_eq!(response.status, 204);
}
