//! Security policies.
//!
//! # Responsibilities
//! - Define the `SecurityPolicy` contract and its `CheckResult`
//! - Provide the built-in policies (permit, deny, authenticated, roles,
//!   permissions, predicate)
//!
//! # Design Decisions
//! - A denial is a value, a failure is an `AuthzError`
//! - Policies that do not need the identity never resolve it, so a `permit`
//!   path does not trigger authentication
//! - A permitting policy may hand back an augmented identity; later
//!   policies in the chain see it instead of the original

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::identity::{LazyIdentity, Permission, SecurityIdentity};
use crate::authz::chain::run_blocking;
use crate::authz::context::RequestContext;
use crate::error::AuthzError;

pub const PERMIT: &str = "permit";
pub const DENY: &str = "deny";
pub const AUTHENTICATED: &str = "authenticated";

/// Role that admits every authenticated identity in `roles_allowed`.
pub const ANY_AUTHENTICATED_ROLE: &str = "**";

/// Outcome of a single policy check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    permitted: bool,
    augmented_identity: Option<Arc<SecurityIdentity>>,
}

impl CheckResult {
    pub fn permit() -> Self {
        Self {
            permitted: true,
            augmented_identity: None,
        }
    }

    pub fn deny() -> Self {
        Self::default()
    }

    /// Permit, replacing the identity seen by the rest of the chain.
    pub fn permit_with(identity: Arc<SecurityIdentity>) -> Self {
        Self {
            permitted: true,
            augmented_identity: Some(identity),
        }
    }

    pub fn from_bool(permitted: bool) -> Self {
        if permitted {
            Self::permit()
        } else {
            Self::deny()
        }
    }

    pub fn is_permitted(&self) -> bool {
        self.permitted
    }

    pub fn augmented_identity(&self) -> Option<&Arc<SecurityIdentity>> {
        self.augmented_identity.as_ref()
    }

    pub fn into_augmented_identity(self) -> Option<Arc<SecurityIdentity>> {
        self.augmented_identity
    }
}

/// An authorization decision procedure for HTTP requests.
#[async_trait]
pub trait SecurityPolicy: Send + Sync {
    /// Name used in logs and configuration.
    fn name(&self) -> &str;

    async fn check_permission(
        &self,
        ctx: &RequestContext,
        identity: &LazyIdentity,
    ) -> Result<CheckResult, AuthzError>;
}

pub type PolicyRef = Arc<dyn SecurityPolicy>;

impl fmt::Debug for dyn SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecurityPolicy({})", self.name())
    }
}

// ============================================================================
// Built-in policies
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct PermitPolicy;

#[async_trait]
impl SecurityPolicy for PermitPolicy {
    fn name(&self) -> &str {
        PERMIT
    }

    async fn check_permission(&self, _: &RequestContext, _: &LazyIdentity) -> Result<CheckResult, AuthzError> {
        Ok(CheckResult::permit())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DenyPolicy;

#[async_trait]
impl SecurityPolicy for DenyPolicy {
    fn name(&self) -> &str {
        DENY
    }

    async fn check_permission(&self, _: &RequestContext, _: &LazyIdentity) -> Result<CheckResult, AuthzError> {
        Ok(CheckResult::deny())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AuthenticatedPolicy;

#[async_trait]
impl SecurityPolicy for AuthenticatedPolicy {
    fn name(&self) -> &str {
        AUTHENTICATED
    }

    async fn check_permission(
        &self,
        _: &RequestContext,
        identity: &LazyIdentity,
    ) -> Result<CheckResult, AuthzError> {
        let identity = identity.get().await?;
        Ok(CheckResult::from_bool(!identity.is_anonymous()))
    }
}

/// Permits identities holding at least one of the allowed roles.
///
/// Before checking, the identity is augmented with the policy's role mapping
/// and with the permissions granted to its roles. When that changes the
/// identity and the check permits, the augmented identity is passed on.
#[derive(Debug, Clone)]
pub struct RolesAllowedPolicy {
    name: String,
    roles_allowed: Vec<String>,
    roles_mapping: BTreeMap<String, Vec<String>>,
    granted_permissions: BTreeMap<String, Vec<Permission>>,
}

impl RolesAllowedPolicy {
    pub fn new<I, S>(name: impl Into<String>, roles_allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            roles_allowed: roles_allowed.into_iter().map(Into::into).collect(),
            roles_mapping: BTreeMap::new(),
            granted_permissions: BTreeMap::new(),
        }
    }

    pub fn with_roles_mapping(mut self, mapping: BTreeMap<String, Vec<String>>) -> Self {
        self.roles_mapping = mapping;
        self
    }

    /// Grant `permissions` to every identity holding `role`.
    pub fn grant(mut self, role: impl Into<String>, permissions: Vec<Permission>) -> Self {
        self.granted_permissions.entry(role.into()).or_default().extend(permissions);
        self
    }

    fn augment(&self, identity: &SecurityIdentity) -> Option<SecurityIdentity> {
        let mapped = identity.map_roles(&self.roles_mapping);
        let base = mapped.as_ref().unwrap_or(identity);

        let granted: Vec<Permission> = base
            .roles()
            .filter_map(|role| self.granted_permissions.get(role))
            .flatten()
            .filter(|p| !base.permissions().any(|held| held == *p))
            .cloned()
            .collect();

        match (mapped, granted.is_empty()) {
            (None, true) => None,
            (Some(mapped), true) => Some(mapped),
            (mapped, false) => Some(mapped.unwrap_or_else(|| identity.clone()).with_permissions(granted)),
        }
    }

    fn admits(&self, identity: &SecurityIdentity) -> bool {
        self.roles_allowed
            .iter()
            .any(|role| role == ANY_AUTHENTICATED_ROLE || identity.has_role(role))
    }
}

#[async_trait]
impl SecurityPolicy for RolesAllowedPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_permission(
        &self,
        _: &RequestContext,
        identity: &LazyIdentity,
    ) -> Result<CheckResult, AuthzError> {
        let identity = identity.get().await?;
        if identity.is_anonymous() {
            return Ok(CheckResult::deny());
        }

        match self.augment(&identity) {
            Some(augmented) if self.admits(&augmented) => Ok(CheckResult::permit_with(Arc::new(augmented))),
            Some(_) => Ok(CheckResult::deny()),
            None => Ok(CheckResult::from_bool(self.admits(&identity))),
        }
    }
}

/// Permits identities holding every listed permission.
#[derive(Debug, Clone)]
pub struct PermissionsPolicy {
    name: String,
    required: Vec<Permission>,
}

impl PermissionsPolicy {
    pub fn new(name: impl Into<String>, required: Vec<Permission>) -> Self {
        Self {
            name: name.into(),
            required,
        }
    }
}

#[async_trait]
impl SecurityPolicy for PermissionsPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_permission(
        &self,
        _: &RequestContext,
        identity: &LazyIdentity,
    ) -> Result<CheckResult, AuthzError> {
        let identity = identity.get().await?;
        let permitted = !identity.is_anonymous() && self.required.iter().all(|p| identity.has_permission(p));
        Ok(CheckResult::from_bool(permitted))
    }
}

pub type Predicate = Arc<dyn Fn(&SecurityIdentity, &RequestContext) -> bool + Send + Sync>;

/// Permits authenticated identities for which a predicate holds.
///
/// Blocking predicates (database lookups, synchronous clients) run on the
/// blocking pool instead of the request task.
#[derive(Clone)]
pub struct PredicatePolicy {
    name: String,
    predicate: Predicate,
    blocking: bool,
}

impl PredicatePolicy {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SecurityIdentity, &RequestContext) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            blocking: false,
        }
    }

    pub fn blocking<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SecurityIdentity, &RequestContext) -> bool + Send + Sync + 'static,
    {
        Self {
            blocking: true,
            ..Self::new(name, predicate)
        }
    }
}

impl fmt::Debug for PredicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicatePolicy")
            .field("name", &self.name)
            .field("blocking", &self.blocking)
            .finish()
    }
}

#[async_trait]
impl SecurityPolicy for PredicatePolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_permission(
        &self,
        ctx: &RequestContext,
        identity: &LazyIdentity,
    ) -> Result<CheckResult, AuthzError> {
        let identity = identity.get().await?;
        if identity.is_anonymous() {
            return Ok(CheckResult::deny());
        }

        let permitted = if self.blocking {
            let predicate = Arc::clone(&self.predicate);
            let task_ctx = ctx.clone();
            run_blocking(ctx, move |_| predicate(&identity, &task_ctx)).await?
        } else {
            (self.predicate)(&identity, ctx)
        };
        Ok(CheckResult::from_bool(permitted))
    }
}
