//! Error taxonomy.
//!
//! # Design Decisions
//! - Configuration errors are fatal and surface at startup
//! - Evaluation failures are per-request and distinct from a denial
//! - A denial is never an error: it is a `CheckResult` value

use thiserror::Error;

/// Startup-time configuration problems. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("path pattern must not be empty")]
    EmptyPathPattern,

    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPathPattern { pattern: String, reason: String },

    #[error("policy '{0}' is defined more than once")]
    DuplicatePolicy(String),

    #[error("unknown policy '{0}'")]
    UnknownPolicy(String),

    #[error("unknown authentication mechanism '{0}'")]
    UnknownMechanism(String),

    #[error("path '{path}' selects conflicting authentication mechanisms '{first}' and '{second}'")]
    ConflictingMechanisms {
        path: String,
        first: String,
        second: String,
    },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ConfigError>),
}

impl ConfigError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidPathPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Raised by an authentication mechanism that could not validate a credential
/// the client did present.
#[derive(Debug, Clone, Error)]
#[error("authentication failed ({mechanism}): {reason}")]
pub struct AuthError {
    pub mechanism: String,
    pub reason: String,
}

impl AuthError {
    pub fn new(mechanism: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            mechanism: mechanism.into(),
            reason: reason.into(),
        }
    }
}

/// Per-request evaluation failures. These mean "could not decide", never "no".
#[derive(Debug, Clone, Error)]
pub enum AuthzError {
    #[error(transparent)]
    Authentication(#[from] AuthError),

    #[error("policy '{policy}' failed: {reason}")]
    Policy { policy: String, reason: String },

    #[error("blocking policy task failed: {0}")]
    Blocking(String),

    #[error("request was cancelled")]
    Cancelled,
}

impl AuthzError {
    pub fn policy(policy: impl Into<String>, reason: impl Into<String>) -> Self {
        AuthzError::Policy {
            policy: policy.into(),
            reason: reason.into(),
        }
    }

    /// Authentication failures are answered with a challenge, everything
    /// else with a server error.
    pub fn is_authentication(&self) -> bool {
        matches!(self, AuthzError::Authentication(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_all() {
        let err = ConfigError::Validation(vec![
            ConfigError::UnknownPolicy("a".into()),
            ConfigError::DuplicatePolicy("b".into()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("unknown policy 'a'"));
        assert!(msg.contains("policy 'b' is defined more than once"));
    }

    #[test]
    fn test_authentication_failure_is_classified() {
        let err: AuthzError = AuthError::new("Bearer", "bad token").into();
        assert!(err.is_authentication());
        assert!(!AuthzError::policy("roles", "boom").is_authentication());
    }
}
