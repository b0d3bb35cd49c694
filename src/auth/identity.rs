//! Security identity and lazily resolved identities.
//!
//! # Responsibilities
//! - Represent the authenticated (or anonymous) principal of a request
//! - Model string permissions (`name[:action,...]`) and their implication
//! - Memoise the asynchronous authentication of a request
//!
//! # Design Decisions
//! - Identities are immutable and shared as `Arc`; augmentation builds a new one
//! - `LazyIdentity` authenticates at most once per request, on first use

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::error::{AuthError, ConfigError};

/// A named permission with an optional set of actions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Permission {
    name: String,
    actions: BTreeSet<String>,
}

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: BTreeSet::new(),
        }
    }

    pub fn with_actions<I, S>(name: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(String::as_str)
    }

    /// A granted permission without actions implies every action of the same
    /// name; otherwise it must cover all required actions.
    pub fn implies(&self, required: &Permission) -> bool {
        self.name == required.name
            && (self.actions.is_empty() || required.actions.is_subset(&self.actions))
    }
}

impl FromStr for Permission {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, actions) = match s.split_once(':') {
            Some((name, actions)) => (name.trim(), actions),
            None => (s.trim(), ""),
        };
        if name.is_empty() {
            return Err(ConfigError::invalid_value(
                "permission",
                format!("'{s}' has no permission name"),
            ));
        }
        let actions = actions
            .split(',')
            .map(str::trim)
            .filter(|action| !action.is_empty());
        Ok(Permission::with_actions(name, actions))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.actions.is_empty() {
            let actions: Vec<&str> = self.actions().collect();
            write!(f, ":{}", actions.join(","))?;
        }
        Ok(())
    }
}

/// The principal associated with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityIdentity {
    principal: Option<String>,
    roles: BTreeSet<String>,
    permissions: BTreeSet<Permission>,
    attributes: BTreeMap<String, String>,
}

impl SecurityIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn named(principal: impl Into<String>) -> Self {
        Self {
            principal: Some(principal.into()),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_permissions<I>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        self.permissions.extend(permissions);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_none()
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    pub fn has_permission(&self, required: &Permission) -> bool {
        self.permissions.iter().any(|granted| granted.implies(required))
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Add the target roles of every mapped role this identity holds.
    /// Returns `None` when the mapping adds nothing.
    pub fn map_roles(&self, mapping: &BTreeMap<String, Vec<String>>) -> Option<SecurityIdentity> {
        let added: BTreeSet<String> = self
            .roles
            .iter()
            .filter_map(|role| mapping.get(role))
            .flatten()
            .filter(|target| !self.roles.contains(*target))
            .cloned()
            .collect();
        if added.is_empty() {
            return None;
        }
        let mut mapped = self.clone();
        mapped.roles.extend(added);
        Some(mapped)
    }
}

type IdentityFuture = BoxFuture<'static, Result<Arc<SecurityIdentity>, AuthError>>;
type Resolver = Arc<dyn Fn() -> IdentityFuture + Send + Sync>;

/// An identity that may not have been authenticated yet.
///
/// Clones share the same memoised result.
#[derive(Clone)]
pub struct LazyIdentity {
    cell: Arc<OnceCell<Arc<SecurityIdentity>>>,
    resolver: Option<Resolver>,
}

impl LazyIdentity {
    /// An identity that is already known.
    pub fn resolved(identity: Arc<SecurityIdentity>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(identity))),
            resolver: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::resolved(Arc::new(SecurityIdentity::anonymous()))
    }

    /// An identity produced by `resolve` the first time it is requested.
    /// A failed attempt is not memoised.
    pub fn deferred<F, Fut>(resolve: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<SecurityIdentity>, AuthError>> + Send + 'static,
    {
        let resolver: Resolver = Arc::new(move || -> IdentityFuture { Box::pin(resolve()) });
        Self {
            cell: Arc::new(OnceCell::new()),
            resolver: Some(resolver),
        }
    }

    pub async fn get(&self) -> Result<Arc<SecurityIdentity>, AuthError> {
        self.cell
            .get_or_try_init(|| async {
                match &self.resolver {
                    Some(resolve) => resolve().await,
                    None => Ok(Arc::new(SecurityIdentity::anonymous())),
                }
            })
            .await
            .cloned()
    }

    /// The identity if authentication already ran.
    pub fn peek(&self) -> Option<Arc<SecurityIdentity>> {
        self.cell.get().cloned()
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.initialized()
    }
}

impl fmt::Debug for LazyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyIdentity")
            .field("identity", &self.cell.get())
            .finish()
    }
}
