//! Static bearer-token authentication.
//!
//! Tokens are configured up front and map to a fixed identity. Suitable for
//! service-to-service credentials and operator API keys.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{header, HeaderValue};

use crate::auth::identity::{Permission, SecurityIdentity};
use crate::auth::mechanism::{
    AuthenticationMechanism, ChallengeData, CredentialTransport, TransportType, DEFAULT_PRIORITY,
};
use crate::authz::context::RequestContext;
use crate::error::{AuthError, ConfigError};

pub const BEARER_SCHEME: &str = "Bearer";

pub struct BearerTokenMechanism {
    realm: String,
    priority: i32,
    tokens: HashMap<String, SecurityIdentity>,
    challenge: HeaderValue,
}

impl BearerTokenMechanism {
    pub fn new(realm: impl Into<String>) -> Result<Self, ConfigError> {
        let realm = realm.into();
        let challenge = HeaderValue::from_str(&format!("{BEARER_SCHEME} realm=\"{realm}\""))
            .map_err(|e| ConfigError::invalid_value("bearer.realm", e.to_string()))?;
        Ok(Self {
            realm,
            priority: DEFAULT_PRIORITY,
            tokens: HashMap::new(),
            challenge,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Register a token for `principal`.
    pub fn with_token(
        mut self,
        token: impl Into<String>,
        principal: impl Into<String>,
        roles: &[String],
        permissions: &[String],
    ) -> Result<Self, ConfigError> {
        let permissions = permissions
            .iter()
            .map(|p| p.parse::<Permission>())
            .collect::<Result<Vec<_>, _>>()?;
        let identity = SecurityIdentity::named(principal)
            .with_roles(roles.iter().cloned())
            .with_permissions(permissions)
            .with_attribute("auth.mechanism", BEARER_SCHEME);
        self.tokens.insert(token.into(), identity);
        Ok(self)
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }
}

#[async_trait]
impl AuthenticationMechanism for BearerTokenMechanism {
    fn name(&self) -> &str {
        "bearer"
    }

    async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<SecurityIdentity>, AuthError> {
        let Some(value) = ctx.header(header::AUTHORIZATION.as_str()) else {
            return Ok(None);
        };
        let Some((scheme, token)) = value.split_once(' ') else {
            return Ok(None);
        };
        if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
            return Ok(None);
        }

        match self.tokens.get(token.trim()) {
            Some(identity) => Ok(Some(identity.clone())),
            None => {
                tracing::warn!(path = ctx.path(), "Rejected unknown bearer token");
                Err(AuthError::new(BEARER_SCHEME, "unknown bearer token"))
            }
        }
    }

    async fn challenge(&self, _ctx: &RequestContext) -> Option<ChallengeData> {
        Some(ChallengeData::www_authenticate(self.challenge.clone()))
    }

    fn credential_transport(&self) -> Option<CredentialTransport> {
        Some(CredentialTransport::new(
            TransportType::Authorization,
            header::AUTHORIZATION.as_str(),
            BEARER_SCHEME,
        ))
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
