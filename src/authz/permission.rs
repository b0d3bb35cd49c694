//! HTTP permission entries and the fluent `HttpSecurity` builder.
//!
//! A permission binds path patterns (and optionally HTTP methods) to a
//! policy. Permissions come from configuration or from code:
//!
//! ```ignore
//! let permissions = HttpSecurity::new()
//!     .path(["/api/*"]).get().authenticated()
//!     .path(["/api/admin/*"]).roles(["admin"])
//!     .path(["/public/*"]).permit()
//!     .build()?;
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::identity::{Permission, SecurityIdentity};
use crate::authz::context::RequestContext;
use crate::authz::policy::{
    AuthenticatedPolicy, DenyPolicy, PermissionsPolicy, PermitPolicy, PolicyRef, PredicatePolicy,
    RolesAllowedPolicy,
};
use crate::error::ConfigError;

/// Whether a permission is enforced for every request or only by the
/// endpoint-level check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppliesTo {
    #[default]
    All,
    Subset,
}

/// One permission: patterns, methods and the policy guarding them.
#[derive(Debug, Clone)]
pub struct HttpPermission {
    pub name: String,
    pub paths: Vec<String>,
    /// Upper-case HTTP methods. Empty means any method.
    pub methods: BTreeSet<String>,
    pub shared: bool,
    pub applies_to: AppliesTo,
    pub auth_mechanism: Option<String>,
    pub policy: PolicyRef,
}

impl HttpPermission {
    pub fn new<I, S>(name: impl Into<String>, paths: I, policy: PolicyRef) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            paths: paths.into_iter().map(Into::into).collect(),
            methods: BTreeSet::new(),
            shared: false,
            applies_to: AppliesTo::All,
            auth_mechanism: None,
            policy,
        }
    }

    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.methods = methods
            .into_iter()
            .map(|m| m.as_ref().trim().to_ascii_uppercase())
            .collect();
        self
    }

    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    pub fn applies_to(mut self, applies_to: AppliesTo) -> Self {
        self.applies_to = applies_to;
        self
    }

    pub fn with_auth_mechanism(mut self, scheme: impl Into<String>) -> Self {
        self.auth_mechanism = Some(scheme.into());
        self
    }
}

/// Fluent collection of permissions.
#[derive(Debug, Default)]
pub struct HttpSecurity {
    permissions: Vec<HttpPermission>,
    errors: Vec<ConfigError>,
}

impl HttpSecurity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a permission for the given path patterns.
    pub fn path<I, S>(self, paths: I) -> PermissionBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PermissionBuilder::new(self, paths.into_iter().map(Into::into).collect(), Vec::new())
    }

    pub fn get<I, S>(self, paths: I) -> PermissionBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path(paths).methods(["GET"])
    }

    pub fn post<I, S>(self, paths: I) -> PermissionBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path(paths).methods(["POST"])
    }

    pub fn put<I, S>(self, paths: I) -> PermissionBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path(paths).methods(["PUT"])
    }

    pub fn delete<I, S>(self, paths: I) -> PermissionBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path(paths).methods(["DELETE"])
    }

    /// Add a prebuilt permission.
    pub fn permission(mut self, permission: HttpPermission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn build(self) -> Result<Vec<HttpPermission>, ConfigError> {
        let mut errors = self.errors;
        match errors.len() {
            0 => Ok(self.permissions),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::Validation(errors)),
        }
    }
}

/// A permission under construction. Finished by one of the policy methods
/// (`permit`, `deny`, `authenticated`, `roles`, `permissions`, `policy`,
/// `predicate`), which hand back the `HttpSecurity`.
#[derive(Debug)]
pub struct PermissionBuilder {
    security: HttpSecurity,
    paths: Vec<String>,
    methods: Vec<String>,
    shared: bool,
    applies_to: AppliesTo,
    auth_mechanism: Option<String>,
}

impl PermissionBuilder {
    fn new(security: HttpSecurity, paths: Vec<String>, methods: Vec<String>) -> Self {
        Self {
            security,
            paths,
            methods,
            shared: false,
            applies_to: AppliesTo::All,
            auth_mechanism: None,
        }
    }

    /// Restrict to the given HTTP methods.
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let methods: Vec<String> = methods.into_iter().map(Into::into).collect();
        if methods.is_empty() {
            self.security
                .errors
                .push(ConfigError::invalid_value("methods", "method list must not be empty"));
        }
        self.methods.extend(methods);
        self
    }

    /// Evaluate together with (and before) the non-shared permissions.
    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    /// Only enforce from the endpoint-level check.
    pub fn apply_to_subset(mut self) -> Self {
        self.applies_to = AppliesTo::Subset;
        self
    }

    /// Authenticate matching requests with the mechanism registered under
    /// `scheme` only.
    pub fn authenticated_with(mut self, scheme: impl Into<String>) -> Self {
        if self.auth_mechanism.is_some() {
            self.security.errors.push(ConfigError::invalid_value(
                "auth_mechanism",
                "authentication mechanism already selected for this permission",
            ));
        }
        self.auth_mechanism = Some(scheme.into());
        self
    }

    pub fn permit(self) -> HttpSecurity {
        self.policy(Arc::new(PermitPolicy))
    }

    pub fn deny(self) -> HttpSecurity {
        self.policy(Arc::new(DenyPolicy))
    }

    pub fn authenticated(self) -> HttpSecurity {
        self.policy(Arc::new(AuthenticatedPolicy))
    }

    pub fn roles<I, S>(mut self, roles: I) -> HttpSecurity
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() {
            self.security
                .errors
                .push(ConfigError::invalid_value("roles", "role list must not be empty"));
        }
        let name = format!("roles-allowed:{}", roles.join(","));
        self.policy(Arc::new(RolesAllowedPolicy::new(name, roles)))
    }

    /// Require every permission, given as `name[:action,...]`.
    pub fn permissions<I, S>(mut self, permissions: I) -> HttpSecurity
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut required = Vec::new();
        for permission in permissions {
            match permission.as_ref().parse::<Permission>() {
                Ok(p) => required.push(p),
                Err(e) => self.security.errors.push(e),
            }
        }
        if required.is_empty() {
            self.security
                .errors
                .push(ConfigError::invalid_value("permissions", "permission list must not be empty"));
        }
        let name = format!(
            "permissions:{}",
            required.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
        );
        self.policy(Arc::new(PermissionsPolicy::new(name, required)))
    }

    pub fn predicate<F>(self, predicate: F) -> HttpSecurity
    where
        F: Fn(&SecurityIdentity, &RequestContext) -> bool + Send + Sync + 'static,
    {
        self.policy(Arc::new(PredicatePolicy::new("predicate", predicate)))
    }

    pub fn policy(self, policy: PolicyRef) -> HttpSecurity {
        let mut security = self.security;
        if self.paths.is_empty() {
            security
                .errors
                .push(ConfigError::invalid_value("paths", "path list must not be empty"));
            return security;
        }

        let name = format!("permission-{}", security.permissions.len());
        let mut permission = HttpPermission::new(name, self.paths, policy)
            .with_methods(self.methods)
            .applies_to(self.applies_to);
        permission.shared = self.shared;
        permission.auth_mechanism = self.auth_mechanism;
        security.permissions.push(permission);
        security
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fluent_builder() {
        let permissions = HttpSecurity::new()
            .path(["/api/*"])
            .authenticated()
            .get(["/api/orders"])
            .roles(["reader"])
            .path(["/api/admin/*"])
            .shared()
            .authenticated_with("Bearer")
            .deny()
            .path(["/api/reports"])
            .apply_to_subset()
            .permissions(["reports:read"])
            .build()
            .unwrap();

        assert_eq!(permissions.len(), 4);
        assert!(permissions[0].methods.is_empty());
        assert_eq!(permissions[0].policy.name(), "authenticated");
        assert!(permissions[1].methods.contains("GET"));
        assert!(permissions[2].shared);
        assert_eq!(permissions[2].auth_mechanism.as_deref(), Some("Bearer"));
        assert_eq!(permissions[3].applies_to, AppliesTo::Subset);
        assert_eq!(permissions[3].policy.name(), "permissions:reports:read");
    }

    #[test]
    fn test_methods_are_normalised() {
        let permissions = HttpSecurity::new()
            .path(["/a"])
            .methods(["get", " Post "])
            .permit()
            .build()
            .unwrap();
        let methods: Vec<&str> = permissions[0].methods.iter().map(String::as_str).collect();
        assert_eq!(methods, vec!["GET", "POST"]);
    }

    #[test]
    fn test_empty_lists_are_rejected() {
        let empty_paths: [&str; 0] = [];
        assert!(HttpSecurity::new().path(empty_paths).permit().build().is_err());

        let empty_roles: [&str; 0] = [];
        assert!(HttpSecurity::new().path(["/a"]).roles(empty_roles).build().is_err());

        let empty_methods: [&str; 0] = [];
        assert!(HttpSecurity::new()
            .path(["/a"])
            .methods(empty_methods)
            .permit()
            .build()
            .is_err());
    }

    #[test]
    fn test_mechanism_selected_twice() {
        let result = HttpSecurity::new()
            .path(["/a"])
            .authenticated_with("Bearer")
            .authenticated_with("header")
            .authenticated()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_all_errors_reported() {
        let empty: [&str; 0] = [];
        let err = HttpSecurity::new()
            .path(empty)
            .permit()
            .path(["/b"])
            .permissions([":bad"])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(errors) if errors.len() == 3));
    }
}
