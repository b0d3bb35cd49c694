//! Per-request state shared by mechanisms and policies.
//!
//! # Design Decisions
//! - Cloning is cheap: the request snapshot lives behind an `Arc`
//! - Policies may record attributes that later policies in the chain read
//! - The cancellation token fires when the client goes away

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::http::{request::Parts, HeaderMap, Method, Request};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const X_REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Default)]
struct ContextState {
    attributes: HashMap<String, String>,
    auth_mechanism: Option<String>,
}

#[derive(Debug)]
struct ContextInner {
    request_id: String,
    path: String,
    method: Method,
    headers: HeaderMap,
    state: Mutex<ContextState>,
    cancellation: CancellationToken,
}

/// Snapshot of an incoming request plus mutable per-request attributes.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    /// The request ID is taken from `x-request-id`, or generated.
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            inner: Arc::new(ContextInner {
                request_id,
                path: path.into(),
                method,
                headers,
                state: Mutex::new(ContextState::default()),
                cancellation: CancellationToken::new(),
            }),
        }
    }

    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().path(),
            request.headers().clone(),
        )
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.path(), parts.headers.clone())
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of the named cookie from the `Cookie` header(s).
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.inner
            .headers
            .get_all(axum::http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.state().attributes.get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state().attributes.insert(key.into(), value.into());
    }

    /// Authentication scheme selected by the matching permission, if any.
    pub fn auth_mechanism(&self) -> Option<String> {
        self.state().auth_mechanism.clone()
    }

    pub fn set_auth_mechanism(&self, scheme: impl Into<String>) {
        self.state().auth_mechanism = Some(scheme.into());
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }

    pub fn cancel(&self) {
        self.inner.cancellation.cancel();
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        // The state holds plain maps; a panic while holding the lock cannot
        // leave them half-updated.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ctx_with_cookie(cookie: &'static str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static(cookie));
        RequestContext::new(Method::GET, "/", headers)
    }

    #[test]
    fn test_request_snapshot() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/orders?limit=5")
            .header("x-tenant", "acme")
            .body(())
            .unwrap();
        let ctx = RequestContext::from_request(&request);
        assert_eq!(ctx.path(), "/api/orders");
        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.header("x-tenant"), Some("acme"));
        assert_eq!(ctx.request_id().len(), 36);
    }

    #[test]
    fn test_request_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));
        let ctx = RequestContext::new(Method::GET, "/", headers);
        assert_eq!(ctx.request_id(), "req-1");
    }

    #[test]
    fn test_attributes_are_shared_between_clones() {
        let ctx = RequestContext::new(Method::GET, "/", HeaderMap::new());
        let clone = ctx.clone();
        clone.set_attribute("checked", "yes");
        clone.set_auth_mechanism("Bearer");
        assert_eq!(ctx.attribute("checked").as_deref(), Some("yes"));
        assert_eq!(ctx.auth_mechanism().as_deref(), Some("Bearer"));
    }

    #[test]
    fn test_cookie_lookup() {
        let ctx = ctx_with_cookie("theme=dark; session=abc123");
        assert_eq!(ctx.cookie("session"), Some("abc123"));
        assert_eq!(ctx.cookie("missing"), None);
    }

    #[test]
    fn test_cancellation() {
        let ctx = RequestContext::new(Method::GET, "/", HeaderMap::new());
        let token = ctx.cancellation_token();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(token.is_cancelled());
    }
}
