//! Access guard: the authenticator and permission indexes wired together.
//!
//! # Responsibilities
//! - Assemble mechanisms, policies and permissions from configuration
//! - Check that every selected mechanism exists
//! - Decide a request: resolve policies, obtain the identity, run the chain
//! - Offer the endpoint-level check for `applies_to = "subset"` permissions
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → PermissionIndex::resolve(path, method)
//!         Policies(p, mechanism) → ctx.set_auth_mechanism(mechanism)
//!         NoRule                 → [default policy] or []
//!     → identity: proactive ? authenticate now : LazyIdentity
//!     → chain::evaluate
//!     → Decision::Permit(identity) | Decision::Deny(resolved identity)
//! ```

use std::sync::Arc;

use crate::auth::authenticator::Authenticator;
use crate::auth::identity::{LazyIdentity, SecurityIdentity};
use crate::auth::mechanism::ChallengeData;
use crate::authz::chain::evaluate;
use crate::authz::context::RequestContext;
use crate::authz::index::{PermissionIndex, Resolution};
use crate::authz::permission::{AppliesTo, HttpPermission};
use crate::authz::policy::{PolicyRef, PERMIT};
use crate::authz::registry::{mechanisms_from_config, permissions_from_config, PolicyRegistry};
use crate::config::schema::AuthConfig;
use crate::error::{AuthzError, ConfigError};

/// Outcome of an access decision.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Continue with this identity, augmented if a policy augmented it.
    Permit(LazyIdentity),
    /// Refused. The identity tells a challenge (anonymous) from a 403.
    Deny(Arc<SecurityIdentity>),
}

impl Decision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, Decision::Permit(_))
    }
}

/// Guard-wide behaviour.
#[derive(Debug, Clone)]
pub struct GuardOptions {
    pub enabled: bool,
    pub root_path: String,
    pub proactive: bool,
    /// Policy for requests no permission covers; `None` permits them.
    pub default_policy: Option<PolicyRef>,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            root_path: "/".to_string(),
            proactive: true,
            default_policy: None,
        }
    }
}

#[derive(Debug)]
pub struct AccessGuard {
    index: PermissionIndex,
    endpoint_index: PermissionIndex,
    authenticator: Arc<Authenticator>,
    options: GuardOptions,
}

impl AccessGuard {
    pub fn new(
        permissions: &[HttpPermission],
        authenticator: Authenticator,
        options: GuardOptions,
    ) -> Result<Self, ConfigError> {
        for permission in permissions {
            if let Some(scheme) = &permission.auth_mechanism {
                if !authenticator.supports_scheme(scheme) {
                    return Err(ConfigError::UnknownMechanism(scheme.clone()));
                }
            }
        }

        let index = PermissionIndex::build(permissions, &options.root_path, AppliesTo::All)?;
        let endpoint_index = PermissionIndex::build(permissions, &options.root_path, AppliesTo::Subset)?;

        tracing::info!(
            permissions = permissions.len(),
            mechanisms = authenticator.mechanisms().len(),
            proactive = options.proactive,
            enabled = options.enabled,
            "Access guard initialized"
        );

        Ok(Self {
            index,
            endpoint_index,
            authenticator: Arc::new(authenticator),
            options,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let registry = PolicyRegistry::from_config(&config.policies)?;
        let permissions = permissions_from_config(&config.permissions, &registry)?;
        let authenticator = Authenticator::new(mechanisms_from_config(&config.mechanisms)?)
            .with_roles_mapping(config.roles_mapping.clone());

        let default_policy = if config.default_policy == PERMIT {
            None
        } else {
            Some(registry.get(&config.default_policy)?)
        };

        let options = GuardOptions {
            enabled: config.enabled,
            root_path: config.root_path.clone(),
            proactive: config.proactive,
            default_policy,
        };
        Self::new(&permissions, authenticator, options)
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    pub fn options(&self) -> &GuardOptions {
        &self.options
    }

    /// Decide whether the request may proceed.
    ///
    /// An `Err` carrying an authentication failure must be answered with a
    /// challenge; any other `Err` means no decision could be made.
    pub async fn authorize(&self, ctx: &RequestContext) -> Result<Decision, AuthzError> {
        if !self.options.enabled {
            return Ok(Decision::Permit(LazyIdentity::anonymous()));
        }

        // Nothing configured: only proactive authentication has work to do.
        if !self.index.has_permissions() && self.options.default_policy.is_none() && !self.options.proactive {
            return Ok(Decision::Permit(self.authenticator.lazy_identity(ctx)));
        }

        // 1. Resolve the policies for this path and method
        let policies = match self.index.resolve(ctx.path(), ctx.method().as_str()) {
            Resolution::Policies(resolved) => {
                if let Some(scheme) = resolved.auth_mechanism {
                    ctx.set_auth_mechanism(scheme);
                }
                resolved.policies
            }
            Resolution::NoRule => self.options.default_policy.iter().cloned().collect(),
        };

        // 2. Obtain the identity, now or on first use
        let identity = if self.options.proactive {
            LazyIdentity::resolved(self.authenticator.identity(ctx).await?)
        } else {
            self.authenticator.lazy_identity(ctx)
        };

        // 3. Run the chain
        self.decide(&policies, identity, ctx).await
    }

    /// Evaluate the `applies_to = "subset"` permissions for an endpoint that
    /// opted into them. Paths without such permissions are permitted.
    ///
    /// When the matching permissions select a mechanism, `identity` is only
    /// kept if it was obtained under that same mechanism; otherwise the
    /// request is authenticated again with the selected one.
    pub async fn check_endpoint(
        &self,
        ctx: &RequestContext,
        identity: LazyIdentity,
    ) -> Result<Decision, AuthzError> {
        if !self.options.enabled || !self.endpoint_index.has_permissions() {
            return Ok(Decision::Permit(identity));
        }

        let resolved = match self.endpoint_index.resolve(ctx.path(), ctx.method().as_str()) {
            Resolution::NoRule => return Ok(Decision::Permit(identity)),
            Resolution::Policies(resolved) => resolved,
        };

        let identity = match resolved.auth_mechanism {
            Some(scheme) => {
                let same_mechanism = ctx
                    .auth_mechanism()
                    .is_some_and(|current| current.eq_ignore_ascii_case(&scheme));
                ctx.set_auth_mechanism(scheme);
                if same_mechanism {
                    identity
                } else {
                    self.authenticator.lazy_identity(ctx)
                }
            }
            None => identity,
        };
        self.decide(&resolved.policies, identity, ctx).await
    }

    pub async fn send_challenge(&self, ctx: &RequestContext) -> ChallengeData {
        self.authenticator.send_challenge(ctx).await
    }

    async fn decide(
        &self,
        policies: &[PolicyRef],
        identity: LazyIdentity,
        ctx: &RequestContext,
    ) -> Result<Decision, AuthzError> {
        if policies.is_empty() {
            return Ok(Decision::Permit(identity));
        }

        let result = evaluate(policies, identity.clone(), ctx).await?;
        if result.is_permitted() {
            let identity = match result.into_augmented_identity() {
                Some(augmented) => LazyIdentity::resolved(augmented),
                None => identity,
            };
            tracing::debug!(path = ctx.path(), method = %ctx.method(), decision = "permit", "Access decided");
            return Ok(Decision::Permit(identity));
        }

        let resolved = identity.get().await?;
        tracing::debug!(
            path = ctx.path(),
            method = %ctx.method(),
            decision = "deny",
            anonymous = resolved.is_anonymous(),
            "Access decided"
        );
        Ok(Decision::Deny(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::bearer::BearerTokenMechanism;
    use crate::auth::header::TrustedHeaderMechanism;
    use crate::auth::mechanism::AuthenticationMechanism;
    use crate::authz::permission::HttpSecurity;
    use crate::authz::policy::DenyPolicy;
    use axum::http::{header, HeaderMap, HeaderValue, Method};

    fn authenticator() -> Authenticator {
        let bearer = BearerTokenMechanism::new("test")
            .unwrap()
            .with_token("admin-token", "root", &["admin".to_string()], &[])
            .unwrap()
            .with_token("user-token", "alice", &["user".to_string()], &[])
            .unwrap();
        let mechanisms: Vec<Arc<dyn AuthenticationMechanism>> = vec![Arc::new(bearer)];
        Authenticator::new(mechanisms)
    }

    fn guard(options: GuardOptions) -> AccessGuard {
        let permissions = HttpSecurity::new()
            .path(["/public/*"])
            .permit()
            .path(["/api/*"])
            .authenticated()
            .path(["/api/admin/*"])
            .roles(["admin"])
            .path(["/reports/*"])
            .apply_to_subset()
            .roles(["admin"])
            .build()
            .unwrap();
        AccessGuard::new(&permissions, authenticator(), options).unwrap()
    }

    fn ctx(method: Method, path: &str, token: Option<&'static str>) -> RequestContext {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(token));
        }
        RequestContext::new(method, path, headers)
    }

    fn lazy() -> GuardOptions {
        GuardOptions {
            proactive: false,
            ..GuardOptions::default()
        }
    }

    #[tokio::test]
    async fn test_permit_path_skips_authentication() {
        let guard = guard(lazy());
        let decision = guard
            .authorize(&ctx(Method::GET, "/public/index.html", Some("Bearer bogus")))
            .await
            .unwrap();
        match decision {
            Decision::Permit(identity) => assert!(!identity.is_resolved()),
            Decision::Deny(_) => panic!("expected permit"),
        }
    }

    #[tokio::test]
    async fn test_proactive_authentication_fails_early() {
        let guard = guard(GuardOptions::default());
        let err = guard
            .authorize(&ctx(Method::GET, "/public/index.html", Some("Bearer bogus")))
            .await
            .unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_roles_and_anonymous_denials() {
        let guard = guard(lazy());

        let admin = guard
            .authorize(&ctx(Method::GET, "/api/admin/users", Some("Bearer admin-token")))
            .await
            .unwrap();
        assert!(admin.is_permitted());

        match guard
            .authorize(&ctx(Method::GET, "/api/admin/users", Some("Bearer user-token")))
            .await
            .unwrap()
        {
            Decision::Deny(identity) => assert_eq!(identity.principal(), Some("alice")),
            Decision::Permit(_) => panic!("expected deny"),
        }

        match guard.authorize(&ctx(Method::GET, "/api/orders", None)).await.unwrap() {
            Decision::Deny(identity) => assert!(identity.is_anonymous()),
            Decision::Permit(_) => panic!("expected deny"),
        }
    }

    #[tokio::test]
    async fn test_default_policy_for_uncovered_paths() {
        let open = guard(lazy());
        assert!(open.authorize(&ctx(Method::GET, "/elsewhere", None)).await.unwrap().is_permitted());

        let closed = guard(GuardOptions {
            default_policy: Some(Arc::new(DenyPolicy)),
            ..lazy()
        });
        assert!(!closed.authorize(&ctx(Method::GET, "/elsewhere", None)).await.unwrap().is_permitted());
    }

    #[tokio::test]
    async fn test_disabled_guard_permits_everything() {
        let guard = guard(GuardOptions {
            enabled: false,
            ..lazy()
        });
        assert!(guard.authorize(&ctx(Method::GET, "/api/admin/x", None)).await.unwrap().is_permitted());
    }

    #[tokio::test]
    async fn test_endpoint_check_uses_subset_permissions() {
        let guard = guard(lazy());
        let request = ctx(Method::GET, "/reports/q1", Some("Bearer user-token"));
        // Not enforced for every request.
        assert!(guard.authorize(&request).await.unwrap().is_permitted());

        let identity = guard.authenticator().lazy_identity(&request);
        let decision = guard.check_endpoint(&request, identity).await.unwrap();
        assert!(!decision.is_permitted());
    }

    fn bearer_and_header() -> Authenticator {
        let bearer = BearerTokenMechanism::new("test")
            .unwrap()
            .with_token("admin-token", "root", &["admin".to_string()], &[])
            .unwrap();
        let header = TrustedHeaderMechanism::new("x-forwarded-user").unwrap();
        let mechanisms: Vec<Arc<dyn AuthenticationMechanism>> = vec![Arc::new(bearer), Arc::new(header)];
        Authenticator::new(mechanisms)
    }

    #[tokio::test]
    async fn test_endpoint_check_honours_selected_mechanism() {
        let permissions = HttpSecurity::new()
            .path(["/reports/*"])
            .apply_to_subset()
            .authenticated_with("header")
            .authenticated()
            .build()
            .unwrap();

        for proactive in [true, false] {
            let options = GuardOptions {
                proactive,
                ..GuardOptions::default()
            };
            let guard = AccessGuard::new(&permissions, bearer_and_header(), options).unwrap();

            // Authenticated by bearer token for the request as a whole...
            let request = ctx(Method::GET, "/reports/q1", Some("Bearer admin-token"));
            let identity = match guard.authorize(&request).await.unwrap() {
                Decision::Permit(identity) => identity,
                Decision::Deny(_) => panic!("expected permit"),
            };
            if proactive {
                assert_eq!(identity.peek().unwrap().principal(), Some("root"));
            }

            // ...but the endpoint only accepts the header mechanism.
            match guard.check_endpoint(&request, identity).await.unwrap() {
                Decision::Deny(identity) => assert!(identity.is_anonymous()),
                Decision::Permit(_) => panic!("bearer identity accepted on header-only endpoint"),
            }
            assert_eq!(request.auth_mechanism().as_deref(), Some("header"));

            let mut headers = HeaderMap::new();
            headers.insert("x-forwarded-user", HeaderValue::from_static("bob"));
            let request = RequestContext::new(Method::GET, "/reports/q1", headers);
            let identity = guard.authenticator().lazy_identity(&request);
            match guard.check_endpoint(&request, identity).await.unwrap() {
                Decision::Permit(identity) => {
                    assert_eq!(identity.get().await.unwrap().principal(), Some("bob"))
                }
                Decision::Deny(_) => panic!("expected permit"),
            }
        }
    }

    #[tokio::test]
    async fn test_no_permissions_skips_evaluation() {
        let guard = AccessGuard::new(&[], authenticator(), lazy()).unwrap();
        let request = ctx(Method::DELETE, "/anything", Some("Bearer bogus"));
        match guard.authorize(&request).await.unwrap() {
            Decision::Permit(identity) => assert!(!identity.is_resolved()),
            Decision::Deny(_) => panic!("expected permit"),
        }
        let identity = LazyIdentity::anonymous();
        assert!(guard.check_endpoint(&request, identity).await.unwrap().is_permitted());

        // Proactive authentication still runs.
        let guard = AccessGuard::new(&[], authenticator(), GuardOptions::default()).unwrap();
        assert!(guard.authorize(&request).await.unwrap_err().is_authentication());
    }

    #[test]
    fn test_unknown_mechanism_rejected() {
        let permissions = HttpSecurity::new()
            .path(["/a"])
            .authenticated_with("Digest")
            .authenticated()
            .build()
            .unwrap();
        let err = AccessGuard::new(&permissions, authenticator(), GuardOptions::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMechanism(scheme) if scheme == "Digest"));
    }
}
