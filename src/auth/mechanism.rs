//! Authentication mechanism abstraction.
//!
//! A mechanism extracts and validates credentials from a request and knows how
//! to challenge a client that presented none.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::auth::identity::SecurityIdentity;
use crate::authz::context::RequestContext;
use crate::error::AuthError;

/// Priority assigned to mechanisms that do not override it.
pub const DEFAULT_PRIORITY: i32 = 1000;

/// Where a mechanism reads its credentials from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Authorization,
    OtherHeader,
    Cookie,
    PostBody,
    X509,
}

/// Describes how a mechanism receives credentials, and under which
/// authentication scheme name it can be selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialTransport {
    pub kind: TransportType,
    /// Header, cookie or form-field name the credential lives in.
    pub target: String,
    pub scheme: String,
}

impl CredentialTransport {
    pub fn new(kind: TransportType, target: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            scheme: scheme.into(),
        }
    }
}

/// A response asking the client to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeData {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl ChallengeData {
    /// Plain `401 Unauthorized` without any challenge header.
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            headers: Vec::new(),
        }
    }

    /// `401 Unauthorized` carrying a `WWW-Authenticate` header.
    pub fn www_authenticate(value: HeaderValue) -> Self {
        Self::unauthorized().with_header(header::WWW_AUTHENTICATE, value)
    }

    /// `302 Found` pointing at a login page.
    pub fn redirect(location: HeaderValue) -> Self {
        Self {
            status: StatusCode::FOUND,
            headers: vec![(header::LOCATION, location)],
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

impl Default for ChallengeData {
    fn default() -> Self {
        Self::unauthorized()
    }
}

impl IntoResponse for ChallengeData {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            headers.append(name, value);
        }
        response
    }
}

/// A pluggable way of authenticating requests.
#[async_trait]
pub trait AuthenticationMechanism: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// `Ok(None)` when the request carries no credential for this mechanism,
    /// `Err` when it carries one that is invalid.
    async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<SecurityIdentity>, AuthError>;

    /// The challenge to send an unauthenticated client, if this mechanism
    /// has one.
    async fn challenge(&self, ctx: &RequestContext) -> Option<ChallengeData>;

    fn credential_transport(&self) -> Option<CredentialTransport> {
        None
    }

    /// Higher priorities are consulted first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }
}
