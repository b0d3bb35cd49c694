//! Shared utilities for integration tests.

#![allow(dead_code)]

use access_guard::config::parse_config;
use access_guard::http::HttpServer;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

/// Guard configuration shared by most tests: two bearer tokens, a trusted
/// header mechanism with a login page, and a mix of permissions.
pub const ORDERS_CONFIG: &str = r#"
[auth]
proactive = false

[auth.roles_mapping]
admin = ["user"]

[[auth.mechanisms]]
kind = "bearer"
realm = "orders"

[auth.mechanisms.tokens.admin-token]
principal = "root"
roles = ["admin"]

[auth.mechanisms.tokens.user-token]
principal = "alice"
roles = ["user"]
permissions = ["orders:read"]

[[auth.mechanisms]]
kind = "trusted-header"
principal_header = "x-forwarded-user"
roles_header = "x-forwarded-roles"
login_url = "/login"

[auth.policies.admins]
roles_allowed = ["admin"]

[auth.policies.users]
roles_allowed = ["user"]

[[auth.permissions]]
name = "public"
paths = ["/public/*", "/login"]
policy = "permit"

[[auth.permissions]]
name = "orders-read"
paths = ["/api/orders/*"]
methods = ["GET"]
policy = "users"

[[auth.permissions]]
name = "orders-write"
paths = ["/api/orders/*"]
policy = "admins"

[[auth.permissions]]
name = "api-authenticated"
paths = ["/api/*"]
policy = "authenticated"
shared = true

[[auth.permissions]]
name = "status"
paths = ["/api/status"]
policy = "permit"

[[auth.permissions]]
name = "catalog"
paths = ["/catalog/*"]
methods = ["GET"]
policy = "permit"

[[auth.permissions]]
name = "portal"
paths = ["/portal/*"]
policy = "authenticated"
auth_mechanism = "header"

[[auth.permissions]]
name = "reports"
paths = ["/reports/*"]
policy = "admins"
applies_to = "subset"

[[auth.permissions]]
name = "vault"
paths = ["/vault/*"]
policy = "authenticated"
applies_to = "subset"
auth_mechanism = "header"
"#;

pub fn router(config: &str) -> Router {
    let config = parse_config(config).expect("valid test config");
    HttpServer::new(config).expect("guard builds").router()
}

pub async fn send(router: &Router, method: Method, path: &str, headers: &[(&str, &str)]) -> Response {
    let mut builder = Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

pub async fn get(router: &Router, path: &str) -> Response {
    send(router, Method::GET, path, &[]).await
}

pub async fn get_with_token(router: &Router, path: &str, token: &str) -> Response {
    let value = format!("Bearer {token}");
    send(router, Method::GET, path, &[(header::AUTHORIZATION.as_str(), &value)]).await
}

pub async fn json_body(response: Response) -> Value {
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
