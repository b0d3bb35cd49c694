//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (permissions reference existing policies
//!   and mechanisms)
//! - Validate value ranges (timeouts > 0, addresses parse) and path patterns
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ConfigError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::Method;

use crate::auth::identity::Permission;
use crate::authz::index::join_root_path;
use crate::authz::registry::PolicyRegistry;
use crate::config::schema::{AuthConfig, GuardConfig, MechanismConfig};
use crate::error::ConfigError;
use crate::matcher::PathMatcher;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate the whole configuration, collecting every problem.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ConfigError::invalid_value(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ConfigError::invalid_value("timeouts.request_secs", "must be greater than 0"));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::invalid_value(
            "observability.log_level",
            format!("'{}' is not one of {}", observability.log_level, LOG_LEVELS.join(", ")),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ConfigError::invalid_value(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    validate_auth(&config.auth, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_auth(auth: &AuthConfig, errors: &mut Vec<ConfigError>) {
    if !auth.root_path.starts_with('/') {
        errors.push(ConfigError::invalid_value("auth.root_path", "must start with '/'"));
    }

    // Named policies
    for (name, policy) in &auth.policies {
        if PolicyRegistry::is_builtin(name) {
            errors.push(ConfigError::DuplicatePolicy(name.clone()));
        }
        if policy.roles_allowed.is_empty() {
            errors.push(ConfigError::invalid_value(
                format!("auth.policies.{name}.roles_allowed"),
                "at least one role is required",
            ));
        }
        for permission in policy.permissions.values().flatten() {
            if let Err(e) = permission.parse::<Permission>() {
                errors.push(e);
            }
        }
    }
    let policy_known = |name: &str| PolicyRegistry::is_builtin(name) || auth.policies.contains_key(name);

    if !policy_known(&auth.default_policy) {
        errors.push(ConfigError::UnknownPolicy(auth.default_policy.clone()));
    }

    // Mechanisms
    for mechanism in &auth.mechanisms {
        if let MechanismConfig::Bearer { tokens, .. } = mechanism {
            for permission in tokens.values().flat_map(|t| &t.permissions) {
                if let Err(e) = permission.parse::<Permission>() {
                    errors.push(e);
                }
            }
        }
    }
    let mechanism_known = |scheme: &str| {
        auth.mechanisms
            .iter()
            .any(|m| m.scheme().eq_ignore_ascii_case(scheme))
    };

    // Permissions
    for (position, permission) in auth.permissions.iter().enumerate() {
        let name = permission
            .name
            .clone()
            .unwrap_or_else(|| format!("permission-{position}"));

        if permission.paths.is_empty() {
            errors.push(ConfigError::invalid_value(
                format!("auth.permissions.{name}.paths"),
                "at least one path is required",
            ));
        }
        for path in &permission.paths {
            if let Err(e) = validate_pattern(&auth.root_path, path) {
                errors.push(e);
            }
        }
        for method in &permission.methods {
            if method.trim().is_empty() || Method::from_bytes(method.trim().as_bytes()).is_err() {
                errors.push(ConfigError::invalid_value(
                    format!("auth.permissions.{name}.methods"),
                    format!("'{method}' is not an HTTP method"),
                ));
            }
        }
        if !policy_known(&permission.policy) {
            errors.push(ConfigError::UnknownPolicy(permission.policy.clone()));
        }
        if let Some(scheme) = &permission.auth_mechanism {
            if !mechanism_known(scheme) {
                errors.push(ConfigError::UnknownMechanism(scheme.clone()));
            }
        }
    }
}

fn validate_pattern(root_path: &str, pattern: &str) -> Result<(), ConfigError> {
    let joined = join_root_path(root_path, pattern)?;
    PathMatcher::<()>::builder().add_path(&joined, ()).build()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PermissionConfig, PolicyConfig};

    fn permission(paths: &[&str], policy: &str) -> PermissionConfig {
        PermissionConfig {
            paths: paths.iter().map(|p| p.to_string()).collect(),
            policy: policy.to_string(),
            ..PermissionConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GuardConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_listener_and_levels() {
        let mut config = GuardConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.observability.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_permission_references() {
        let mut config = GuardConfig::default();
        config.auth.permissions.push(permission(&["/a"], "nope"));
        config.auth.permissions.push(PermissionConfig {
            auth_mechanism: Some("Bearer".to_string()),
            ..permission(&["/b"], "authenticated")
        });
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ConfigError::UnknownPolicy(p) if p == "nope")));
        assert!(errors.iter().any(|e| matches!(e, ConfigError::UnknownMechanism(m) if m == "Bearer")));
    }

    #[test]
    fn test_invalid_patterns_and_methods() {
        let mut config = GuardConfig::default();
        config.auth.permissions.push(PermissionConfig {
            methods: vec!["GE T".to_string()],
            ..permission(&["/a/b*c/d", ""], "permit")
        });
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ConfigError::InvalidPathPattern { .. })));
        assert!(errors.iter().any(|e| matches!(e, ConfigError::EmptyPathPattern)));
        assert!(errors.iter().any(|e| matches!(e, ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_reserved_and_empty_policies() {
        let mut config = GuardConfig::default();
        config.auth.policies.insert("permit".to_string(), PolicyConfig::default());
        config.auth.default_policy = "unknown".to_string();
        let errors = validate_config(&config).unwrap_err();
        // Reserved name, missing roles, unknown default.
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_named_policy_is_known() {
        let mut config = GuardConfig::default();
        config.auth.policies.insert(
            "admins".to_string(),
            PolicyConfig {
                roles_allowed: vec!["admin".to_string()],
                ..PolicyConfig::default()
            },
        );
        config.auth.default_policy = "admins".to_string();
        config.auth.permissions.push(permission(&["admin/*"], "admins"));
        assert!(validate_config(&config).is_ok());
    }
}
