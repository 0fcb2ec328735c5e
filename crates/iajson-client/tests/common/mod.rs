//! Shared test fixtures: a recording in-memory transport and sample manifests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use iajson_client::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
use serde_json::{json, Value};

type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

struct Route {
    method: HttpMethod,
    url: String,
    responder: Responder,
}

/// Transport that answers from registered routes and records every request.
///
/// Routes match on method and URL without its query string. Unmatched
/// requests get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").finish_non_exhaustive()
    }
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: HttpMethod, url: &str, response: HttpResponse) {
        self.on_with(method, url, move |_| Ok(response.clone()));
    }

    pub fn on_json(&self, method: HttpMethod, url: &str, status: u16, body: Value) {
        self.on(method, url, HttpResponse::new(status, body.to_string()));
    }

    pub fn on_with(
        &self,
        method: HttpMethod,
        url: &str,
        responder: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) {
        self.routes.lock().unwrap().push(Route {
            method,
            url: url.to_string(),
            responder: Box::new(responder),
        });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let without_query = request.url.split('?').next().unwrap_or_default().to_string();

        let routes = self.routes.lock().unwrap();
        match routes
            .iter()
            .find(|r| r.method == request.method && r.url == without_query)
        {
            Some(route) => (route.responder)(&request),
            None => Ok(HttpResponse::new(404, "")),
        }
    }
}

/// Manifest with one operation per tier plus signed-key and OAuth sections.
pub fn shop_manifest() -> Value {
    json!({
        "version": "1.0.0",
        "site": { "name": "Example Shop", "type": "ecommerce", "url": "https://shop.example" },
        "api": {
            "base_url": "https://shop.example/api",
            "public": {
                "search_products": {
                    "method": "GET",
                    "path": "/products/search",
                    "parameters": { "q": { "type": "string", "required": true } }
                },
                "get_product": { "method": "GET", "path": "/products/{id}" }
            },
            "protected": {
                "add_to_cart": {
                    "method": "POST",
                    "path": "/cart/items",
                    "body": {
                        "product_id": { "type": "string", "required": true },
                        "quantity": { "type": "integer" }
                    }
                },
                "remove_from_cart": { "method": "DELETE", "path": "/cart/items/{item_id}" }
            },
            "user_required": {
                "get_orders": {
                    "method": "GET",
                    "path": "/users/{user_id}/orders",
                    "scopes": ["orders:read"]
                }
            }
        },
        "auth": {
            "signed_key": {
                "register_url": "https://shop.example/api/ia/register",
                "algorithm": "sha256",
                "header_prefix": "X-IA-"
            },
            "oauth2": {
                "authorization_url": "https://shop.example/oauth/authorize",
                "token_url": "https://shop.example/oauth/token",
                "scopes": { "orders:read": "Read your orders" },
                "grant_types": ["authorization_code", "refresh_token"],
                "pkce_required": true
            }
        },
        "capabilities": { "webhooks": true, "cart": true }
    })
}

pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}
