//! Named policies and assembly of configuration into runtime objects.
//!
//! # Responsibilities
//! - Hold built-in and named policies; reject duplicate and unknown names
//! - Turn `[auth.policies]`, `[[auth.permissions]]` and
//!   `[[auth.mechanisms]]` sections into policies, permissions and mechanisms

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::auth::bearer::BearerTokenMechanism;
use crate::auth::header::TrustedHeaderMechanism;
use crate::auth::identity::Permission;
use crate::auth::mechanism::AuthenticationMechanism;
use crate::authz::permission::HttpPermission;
use crate::authz::policy::{
    AuthenticatedPolicy, DenyPolicy, PermitPolicy, PolicyRef, RolesAllowedPolicy, AUTHENTICATED, DENY, PERMIT,
};
use crate::config::schema::{MechanismConfig, PermissionConfig, PolicyConfig};
use crate::error::ConfigError;

/// Policies addressable by name.
#[derive(Debug)]
pub struct PolicyRegistry {
    policies: HashMap<String, PolicyRef>,
}

impl PolicyRegistry {
    /// A registry holding the built-in policies only.
    pub fn new() -> Self {
        let mut policies: HashMap<String, PolicyRef> = HashMap::new();
        policies.insert(PERMIT.to_string(), Arc::new(PermitPolicy));
        policies.insert(DENY.to_string(), Arc::new(DenyPolicy));
        policies.insert(AUTHENTICATED.to_string(), Arc::new(AuthenticatedPolicy));
        Self { policies }
    }

    /// Built-ins plus the configured named policies.
    pub fn from_config(policies: &BTreeMap<String, PolicyConfig>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for (name, config) in policies {
            registry.register(name, Arc::new(roles_policy_from_config(name, config)?))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, policy: PolicyRef) -> Result<(), ConfigError> {
        let name = name.into();
        if self.policies.contains_key(&name) {
            return Err(ConfigError::DuplicatePolicy(name));
        }
        self.policies.insert(name, policy);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<PolicyRef, ConfigError> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownPolicy(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    pub fn is_builtin(name: &str) -> bool {
        matches!(name, PERMIT | DENY | AUTHENTICATED)
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn roles_policy_from_config(name: &str, config: &PolicyConfig) -> Result<RolesAllowedPolicy, ConfigError> {
    if config.roles_allowed.is_empty() {
        return Err(ConfigError::invalid_value(
            format!("auth.policies.{name}.roles_allowed"),
            "at least one role is required",
        ));
    }

    let mut policy =
        RolesAllowedPolicy::new(name, config.roles_allowed.iter().cloned()).with_roles_mapping(config.roles.clone());
    for (role, permissions) in &config.permissions {
        let permissions = parse_permissions(permissions)?;
        policy = policy.grant(role.clone(), permissions);
    }
    Ok(policy)
}

fn parse_permissions(permissions: &[String]) -> Result<Vec<Permission>, ConfigError> {
    permissions.iter().map(|p| p.parse()).collect()
}

/// Resolve enabled permission entries against the registry.
pub fn permissions_from_config(
    configs: &[PermissionConfig],
    registry: &PolicyRegistry,
) -> Result<Vec<HttpPermission>, ConfigError> {
    let mut permissions = Vec::with_capacity(configs.len());
    for (position, config) in configs.iter().enumerate() {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("permission-{position}"));
        if !config.enabled {
            tracing::debug!(permission = %name, "Skipping disabled permission");
            continue;
        }
        if config.paths.is_empty() {
            return Err(ConfigError::invalid_value(
                format!("auth.permissions.{name}.paths"),
                "at least one path is required",
            ));
        }

        let policy = registry.get(&config.policy)?;
        let mut permission = HttpPermission::new(name, config.paths.iter().cloned(), policy)
            .with_methods(&config.methods)
            .applies_to(config.applies_to);
        permission.shared = config.shared;
        permission.auth_mechanism = config.auth_mechanism.clone();
        permissions.push(permission);
    }
    Ok(permissions)
}

/// Instantiate the configured authentication mechanisms.
pub fn mechanisms_from_config(
    configs: &[MechanismConfig],
) -> Result<Vec<Arc<dyn AuthenticationMechanism>>, ConfigError> {
    let mut mechanisms: Vec<Arc<dyn AuthenticationMechanism>> = Vec::with_capacity(configs.len());
    for config in configs {
        match config {
            MechanismConfig::Bearer {
                realm,
                priority,
                tokens,
            } => {
                let mut mechanism = BearerTokenMechanism::new(realm.as_str())?;
                if let Some(priority) = priority {
                    mechanism = mechanism.with_priority(*priority);
                }
                for (token, identity) in tokens {
                    mechanism =
                        mechanism.with_token(token.as_str(), identity.principal.as_str(), &identity.roles, &identity.permissions)?;
                }
                mechanisms.push(Arc::new(mechanism));
            }
            MechanismConfig::TrustedHeader {
                scheme,
                principal_header,
                roles_header,
                login_url,
                priority,
            } => {
                let mut mechanism = TrustedHeaderMechanism::new(principal_header)?.with_scheme(scheme.as_str());
                if let Some(header) = roles_header {
                    mechanism = mechanism.with_roles_header(header)?;
                }
                if let Some(url) = login_url {
                    mechanism = mechanism.with_login_url(url)?;
                }
                if let Some(priority) = priority {
                    mechanism = mechanism.with_priority(*priority);
                }
                mechanisms.push(Arc::new(mechanism));
            }
        }
    }
    Ok(mechanisms)
}
