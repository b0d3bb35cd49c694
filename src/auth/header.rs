//! Trusted-header authentication.
//!
//! For deployments behind an authenticating edge (SSO proxy, API gateway)
//! that forwards the caller's identity in request headers. The headers are
//! trusted as-is; the edge must strip them from client traffic.

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};

use crate::auth::identity::SecurityIdentity;
use crate::auth::mechanism::{
    AuthenticationMechanism, ChallengeData, CredentialTransport, TransportType, DEFAULT_PRIORITY,
};
use crate::authz::context::RequestContext;
use crate::error::{AuthError, ConfigError};

pub const DEFAULT_HEADER_SCHEME: &str = "header";

#[derive(Debug)]
pub struct TrustedHeaderMechanism {
    scheme: String,
    principal_header: HeaderName,
    roles_header: Option<HeaderName>,
    login_url: Option<HeaderValue>,
    priority: i32,
}

impl TrustedHeaderMechanism {
    pub fn new(principal_header: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            scheme: DEFAULT_HEADER_SCHEME.to_string(),
            principal_header: parse_header_name("principal_header", principal_header)?,
            roles_header: None,
            login_url: None,
            priority: DEFAULT_PRIORITY,
        })
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Comma-separated roles header.
    pub fn with_roles_header(mut self, header: &str) -> Result<Self, ConfigError> {
        self.roles_header = Some(parse_header_name("roles_header", header)?);
        Ok(self)
    }

    /// Redirect unauthenticated clients to the edge's login page.
    pub fn with_login_url(mut self, url: &str) -> Result<Self, ConfigError> {
        let location = HeaderValue::from_str(url)
            .map_err(|e| ConfigError::invalid_value("login_url", e.to_string()))?;
        self.login_url = Some(location);
        Ok(self)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

fn parse_header_name(field: &str, name: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::invalid_value(field, e.to_string()))
}

#[async_trait]
impl AuthenticationMechanism for TrustedHeaderMechanism {
    fn name(&self) -> &str {
        "trusted-header"
    }

    async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<SecurityIdentity>, AuthError> {
        let Some(value) = ctx.headers().get(&self.principal_header) else {
            return Ok(None);
        };
        let principal = value
            .to_str()
            .map(str::trim)
            .map_err(|_| AuthError::new(&self.scheme, "principal header is not valid text"))?;
        if principal.is_empty() {
            return Err(AuthError::new(&self.scheme, "principal header is empty"));
        }

        let roles = self
            .roles_header
            .as_ref()
            .and_then(|name| ctx.headers().get(name))
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Some(
            SecurityIdentity::named(principal)
                .with_roles(roles)
                .with_attribute("auth.mechanism", self.scheme.as_str()),
        ))
    }

    async fn challenge(&self, _ctx: &RequestContext) -> Option<ChallengeData> {
        self.login_url.clone().map(ChallengeData::redirect)
    }

    fn credential_transport(&self) -> Option<CredentialTransport> {
        Some(CredentialTransport::new(
            TransportType::OtherHeader,
            self.principal_header.as_str(),
            self.scheme.as_str(),
        ))
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
