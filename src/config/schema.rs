//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::authz::permission::AppliesTo;

/// Root configuration for the access guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Authentication and authorization settings.
    pub auth: AuthConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time allowed for in-flight requests to finish on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Authentication and authorization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable the guard. When disabled every request passes through.
    pub enabled: bool,

    /// Prefix for relative permission paths.
    pub root_path: String,

    /// Authenticate every request before policies run. When false, requests
    /// are only authenticated if a policy needs the identity.
    pub proactive: bool,

    /// Policy applied to requests no permission covers.
    pub default_policy: String,

    /// Roles granted to every authenticated identity holding the key role.
    pub roles_mapping: BTreeMap<String, Vec<String>>,

    /// Authentication mechanisms.
    pub mechanisms: Vec<MechanismConfig>,

    /// Named policies, referenced by permissions.
    pub policies: BTreeMap<String, PolicyConfig>,

    /// Path permissions.
    pub permissions: Vec<PermissionConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root_path: "/".to_string(),
            proactive: true,
            default_policy: crate::authz::policy::PERMIT.to_string(),
            roles_mapping: BTreeMap::new(),
            mechanisms: Vec::new(),
            policies: BTreeMap::new(),
            permissions: Vec::new(),
        }
    }
}

/// An authentication mechanism.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MechanismConfig {
    /// Static bearer tokens (`Authorization: Bearer <token>`).
    Bearer {
        #[serde(default = "default_realm")]
        realm: String,
        #[serde(default)]
        priority: Option<i32>,
        #[serde(default)]
        tokens: BTreeMap<String, TokenConfig>,
    },

    /// Identity headers set by a trusted, authenticating edge proxy.
    TrustedHeader {
        #[serde(default = "default_header_scheme")]
        scheme: String,
        principal_header: String,
        #[serde(default)]
        roles_header: Option<String>,
        /// Redirect target for unauthenticated clients.
        #[serde(default)]
        login_url: Option<String>,
        #[serde(default)]
        priority: Option<i32>,
    },
}

impl MechanismConfig {
    /// Scheme name that permissions use to select this mechanism.
    pub fn scheme(&self) -> &str {
        match self {
            MechanismConfig::Bearer { .. } => crate::auth::bearer::BEARER_SCHEME,
            MechanismConfig::TrustedHeader { scheme, .. } => scheme,
        }
    }
}

fn default_realm() -> String {
    "access-guard".to_string()
}

fn default_header_scheme() -> String {
    crate::auth::header::DEFAULT_HEADER_SCHEME.to_string()
}

/// The identity behind one bearer token.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TokenConfig {
    pub principal: String,
    pub roles: Vec<String>,
    /// Permissions as `name[:action,...]`.
    pub permissions: Vec<String>,
}

/// A named roles-allowed policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Roles admitted by the policy; `**` admits any authenticated identity.
    pub roles_allowed: Vec<String>,

    /// Role mapping applied before the check.
    pub roles: BTreeMap<String, Vec<String>>,

    /// Permissions (`name[:action,...]`) granted per role.
    pub permissions: BTreeMap<String, Vec<String>>,
}

/// A path permission.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Name used in logs. Defaults to the position in the list.
    pub name: Option<String>,

    pub enabled: bool,

    /// Path patterns. Relative patterns are joined with `auth.root_path`.
    pub paths: Vec<String>,

    /// HTTP methods. Empty means any method.
    pub methods: Vec<String>,

    /// Built-in (`permit`, `deny`, `authenticated`) or named policy.
    pub policy: String,

    /// Evaluate before, and in addition to, the non-shared permissions.
    pub shared: bool,

    pub applies_to: AppliesTo,

    /// Scheme of the only mechanism allowed to authenticate these paths.
    pub auth_mechanism: Option<String>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            name: None,
            enabled: true,
            paths: Vec::new(),
            methods: Vec::new(),
            policy: String::new(),
            shared: false,
            applies_to: AppliesTo::All,
            auth_mechanism: None,
        }
    }
}
