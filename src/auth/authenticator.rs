//! Authenticator: dispatches to the configured mechanisms.
//!
//! # Responsibilities
//! - Order mechanisms by priority (highest first)
//! - Restrict candidates to the scheme a permission selected
//! - Fall back to the anonymous identity when nobody authenticates
//! - Produce the challenge for unauthenticated clients
//! - Apply global role mapping to authenticated identities
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → candidates (selected scheme, or all)
//!     → first Some(identity) wins / first Err aborts
//!     → role mapping
//!     → Arc<SecurityIdentity> (anonymous if none)
//! ```

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::identity::{LazyIdentity, SecurityIdentity};
use crate::auth::mechanism::{AuthenticationMechanism, ChallengeData};
use crate::authz::context::RequestContext;
use crate::error::AuthError;

pub struct Authenticator {
    mechanisms: Vec<Arc<dyn AuthenticationMechanism>>,
    roles_mapping: BTreeMap<String, Vec<String>>,
}

impl Authenticator {
    pub fn new(mut mechanisms: Vec<Arc<dyn AuthenticationMechanism>>) -> Self {
        // Stable sort: equal priorities keep registration order.
        mechanisms.sort_by_key(|m| Reverse(m.priority()));
        Self {
            mechanisms,
            roles_mapping: BTreeMap::new(),
        }
    }

    /// Roles added to every authenticated identity holding the key role.
    pub fn with_roles_mapping(mut self, mapping: BTreeMap<String, Vec<String>>) -> Self {
        self.roles_mapping = mapping;
        self
    }

    pub fn mechanisms(&self) -> &[Arc<dyn AuthenticationMechanism>] {
        &self.mechanisms
    }

    /// Whether any mechanism accepts credentials under `scheme`.
    pub fn supports_scheme(&self, scheme: &str) -> bool {
        self.mechanisms
            .iter()
            .any(|m| matches_scheme(m.as_ref(), scheme))
    }

    fn candidates<'a>(
        &'a self,
        ctx: &RequestContext,
    ) -> impl Iterator<Item = &'a Arc<dyn AuthenticationMechanism>> + 'a {
        let selected = ctx.auth_mechanism();
        self.mechanisms.iter().filter(move |m| match &selected {
            Some(scheme) => matches_scheme(m.as_ref(), scheme),
            None => true,
        })
    }

    /// Authenticate with the first mechanism that recognises a credential.
    /// `Ok(None)` means no credential was presented.
    pub async fn attempt_authentication(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<SecurityIdentity>, AuthError> {
        for mechanism in self.candidates(ctx) {
            if let Some(identity) = mechanism.authenticate(ctx).await? {
                tracing::debug!(
                    mechanism = mechanism.name(),
                    principal = identity.principal().unwrap_or_default(),
                    "Request authenticated"
                );
                let identity = identity.map_roles(&self.roles_mapping).unwrap_or(identity);
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    /// Authenticated identity, or the anonymous identity if no credential
    /// was presented.
    pub async fn identity(&self, ctx: &RequestContext) -> Result<Arc<SecurityIdentity>, AuthError> {
        let identity = self
            .attempt_authentication(ctx)
            .await
            .inspect_err(|e| tracing::debug!(error = %e, path = ctx.path(), "Authentication failed"))?;
        Ok(Arc::new(identity.unwrap_or_else(SecurityIdentity::anonymous)))
    }

    /// Identity that authenticates `ctx` the first time it is requested.
    pub fn lazy_identity(self: &Arc<Self>, ctx: &RequestContext) -> LazyIdentity {
        let authenticator = Arc::clone(self);
        let ctx = ctx.clone();
        LazyIdentity::deferred(move || {
            let authenticator = Arc::clone(&authenticator);
            let ctx = ctx.clone();
            async move { authenticator.identity(&ctx).await }
        })
    }

    /// The challenge of the first mechanism that offers one; a bare 401
    /// otherwise.
    pub async fn send_challenge(&self, ctx: &RequestContext) -> ChallengeData {
        for mechanism in self.candidates(ctx) {
            if let Some(challenge) = mechanism.challenge(ctx).await {
                return challenge;
            }
        }
        ChallengeData::unauthorized()
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.mechanisms.iter().map(|m| m.name()).collect();
        f.debug_struct("Authenticator")
            .field("mechanisms", &names)
            .field("roles_mapping", &self.roles_mapping)
            .finish()
    }
}

fn matches_scheme(mechanism: &dyn AuthenticationMechanism, scheme: &str) -> bool {
    mechanism
        .credential_transport()
        .is_some_and(|t| t.scheme.eq_ignore_ascii_case(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::mechanism::{CredentialTransport, TransportType};
    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};

    struct Fixed {
        name: &'static str,
        priority: i32,
        header: &'static str,
    }

    #[async_trait]
    impl AuthenticationMechanism for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<SecurityIdentity>, AuthError> {
            match ctx.header(self.header) {
                Some("bad") => Err(AuthError::new(self.name, "rejected")),
                Some(user) => Ok(Some(
                    SecurityIdentity::named(user).with_roles(["admin"]).with_attribute("via", self.name),
                )),
                None => Ok(None),
            }
        }

        async fn challenge(&self, _ctx: &RequestContext) -> Option<ChallengeData> {
            Some(ChallengeData::www_authenticate(HeaderValue::from_static(self.name)))
        }

        fn credential_transport(&self) -> Option<CredentialTransport> {
            Some(CredentialTransport::new(TransportType::OtherHeader, self.header, self.name))
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn authenticator() -> Authenticator {
        Authenticator::new(vec![
            Arc::new(Fixed { name: "low", priority: 1, header: "x-user" }),
            Arc::new(Fixed { name: "high", priority: 10, header: "x-user" }),
        ])
    }

    fn ctx(user: Option<&'static str>) -> RequestContext {
        let mut headers = HeaderMap::new();
        if let Some(user) = user {
            headers.insert("x-user", HeaderValue::from_static(user));
        }
        RequestContext::new(Method::GET, "/", headers)
    }

    #[tokio::test]
    async fn test_priority_order() {
        let auth = authenticator();
        assert_eq!(auth.mechanisms()[0].name(), "high");
        let identity = auth.identity(&ctx(Some("alice"))).await.unwrap();
        assert_eq!(identity.attribute("via"), Some("high"));
    }

    #[tokio::test]
    async fn test_selected_scheme_restricts_candidates() {
        let auth = authenticator();
        let ctx = ctx(Some("alice"));
        ctx.set_auth_mechanism("LOW");
        let identity = auth.identity(&ctx).await.unwrap();
        assert_eq!(identity.attribute("via"), Some("low"));
        assert!(auth.supports_scheme("high"));
        assert!(!auth.supports_scheme("basic"));
    }

    #[tokio::test]
    async fn test_anonymous_fallback_and_failure() {
        let auth = authenticator();
        assert!(auth.identity(&ctx(None)).await.unwrap().is_anonymous());
        assert!(auth.identity(&ctx(Some("bad"))).await.is_err());
    }

    #[tokio::test]
    async fn test_roles_mapping_applied() {
        let auth = authenticator()
            .with_roles_mapping(BTreeMap::from([("admin".to_string(), vec!["user".to_string()])]));
        let identity = auth.identity(&ctx(Some("alice"))).await.unwrap();
        assert!(identity.has_role("user"));
    }

    #[tokio::test]
    async fn test_challenge_defaults_to_401() {
        let empty = Authenticator::new(Vec::new());
        assert_eq!(empty.send_challenge(&ctx(None)).await.status, StatusCode::UNAUTHORIZED);
        assert!(empty.send_challenge(&ctx(None)).await.headers.is_empty());

        let auth = authenticator();
        let challenge = auth.send_challenge(&ctx(None)).await;
        assert_eq!(challenge.headers[0].1, "high");
    }

    #[tokio::test]
    async fn test_lazy_identity_defers_authentication() {
        let auth = Arc::new(authenticator());
        let lazy = auth.lazy_identity(&ctx(Some("alice")));
        assert!(!lazy.is_resolved());
        assert_eq!(lazy.get().await.unwrap().principal(), Some("alice"));
    }
}
