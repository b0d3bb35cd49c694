//! Permission index: request path + method → ordered policies.
//!
//! # Responsibilities
//! - Compile permissions into path matchers at startup
//! - Select method-specific entries, falling back to method-agnostic ones
//! - Deny requests whose path matches only entries for other methods
//! - Put shared permissions ahead of the main ones
//!
//! # Data Flow
//! ```text
//! HttpPermission[] (applies_to filter, root_path join)
//!     → one PathMatcher per shared permission
//!     → one PathMatcher for all other permissions (list-append merge)
//!
//! resolve(path, method):
//!     shared matchers (in order) → main matcher
//!         → per matcher: method entries | method-agnostic entries | deny
//!     → NoRule if no matcher matched
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::authz::permission::{AppliesTo, HttpPermission};
use crate::authz::policy::{DenyPolicy, PolicyRef};
use crate::error::ConfigError;
use crate::matcher::PathMatcher;

#[derive(Debug, Clone)]
struct HttpMatcher {
    permission: String,
    methods: BTreeSet<String>,
    auth_mechanism: Option<String>,
    policy: PolicyRef,
}

impl HttpMatcher {
    fn from_permission(permission: &HttpPermission) -> Self {
        Self {
            permission: permission.name.clone(),
            methods: permission.methods.clone(),
            auth_mechanism: permission.auth_mechanism.clone(),
            policy: Arc::clone(&permission.policy),
        }
    }
}

fn append(existing: &mut Vec<HttpMatcher>, mut more: Vec<HttpMatcher>) {
    existing.append(&mut more);
}

/// Policies that apply to a request.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPolicies {
    pub policies: Vec<PolicyRef>,
    /// Authentication scheme selected by the matching entries.
    pub auth_mechanism: Option<String>,
}

/// Outcome of an index lookup.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// No permission covers the path; distinct from a denial.
    NoRule,
    Policies(ResolvedPolicies),
}

/// Immutable lookup structure built from permission entries.
#[derive(Debug)]
pub struct PermissionIndex {
    shared: Vec<PathMatcher<Vec<HttpMatcher>>>,
    main: PathMatcher<Vec<HttpMatcher>>,
    permission_count: usize,
    deny: PolicyRef,
}

impl PermissionIndex {
    pub fn empty() -> Self {
        Self {
            shared: Vec::new(),
            main: PathMatcher::empty(),
            permission_count: 0,
            deny: Arc::new(DenyPolicy),
        }
    }

    /// Build the index over the permissions whose `applies_to` equals
    /// `applies_to`. Relative patterns are joined with `root_path`.
    pub fn build(
        permissions: &[HttpPermission],
        root_path: &str,
        applies_to: AppliesTo,
    ) -> Result<Self, ConfigError> {
        let selected: Vec<&HttpPermission> = permissions
            .iter()
            .filter(|p| p.applies_to == applies_to)
            .collect();

        let mut shared = Vec::new();
        let mut main = PathMatcher::<Vec<HttpMatcher>>::builder().accumulator(append);
        let mut mechanisms: HashMap<String, &str> = HashMap::new();

        for permission in &selected {
            let patterns = permission
                .paths
                .iter()
                .map(|path| join_root_path(root_path, path))
                .collect::<Result<Vec<_>, _>>()?;
            let entry = HttpMatcher::from_permission(permission);

            if permission.shared {
                let mut builder =
                    PathMatcher::<Vec<HttpMatcher>>::builder().accumulator(append);
                for pattern in &patterns {
                    builder = builder.add_path(pattern, vec![entry.clone()]);
                }
                shared.push(builder.build()?);
                continue;
            }

            for pattern in patterns {
                if let Some(scheme) = permission.auth_mechanism.as_deref() {
                    match mechanisms.get(&pattern) {
                        Some(existing) if !existing.eq_ignore_ascii_case(scheme) => {
                            return Err(ConfigError::ConflictingMechanisms {
                                path: pattern,
                                first: existing.to_string(),
                                second: scheme.to_string(),
                            });
                        }
                        Some(_) => {}
                        None => {
                            mechanisms.insert(pattern.clone(), scheme);
                        }
                    }
                }
                main = main.add_path(&pattern, vec![entry.clone()]);
            }
        }

        let index = Self {
            shared,
            main: main.build()?,
            permission_count: selected.len(),
            deny: Arc::new(DenyPolicy),
        };
        tracing::debug!(
            permissions = index.permission_count,
            shared = index.shared.len(),
            applies_to = ?applies_to,
            "Permission index built"
        );
        Ok(index)
    }

    /// Whether any permission was indexed.
    pub fn has_permissions(&self) -> bool {
        self.permission_count > 0
    }

    /// Policies for `path` and `method` (upper-case), shared ones first.
    pub fn resolve(&self, path: &str, method: &str) -> Resolution {
        let mut resolved = ResolvedPolicies::default();
        let mut matched = false;

        for matcher in self.shared.iter().chain(std::iter::once(&self.main)) {
            if let Some(entries) = matcher.match_path(path).value() {
                matched = true;
                self.collect(entries, method, &mut resolved);
            }
        }

        if matched {
            Resolution::Policies(resolved)
        } else {
            Resolution::NoRule
        }
    }

    fn collect(&self, entries: &[HttpMatcher], method: &str, out: &mut ResolvedPolicies) {
        let mut chosen: Vec<&HttpMatcher> = entries.iter().filter(|e| e.methods.contains(method)).collect();
        if chosen.is_empty() {
            chosen = entries.iter().filter(|e| e.methods.is_empty()).collect();
        }
        if chosen.is_empty() {
            // The path is only configured for other methods.
            out.policies.push(Arc::clone(&self.deny));
            return;
        }

        for entry in chosen {
            if out.auth_mechanism.is_none() {
                out.auth_mechanism = entry.auth_mechanism.clone();
            }
            tracing::trace!(permission = %entry.permission, policy = entry.policy.name(), "Permission matched");
            out.policies.push(Arc::clone(&entry.policy));
        }
    }
}

impl Default for PermissionIndex {
    fn default() -> Self {
        Self::empty()
    }
}

/// Resolve a configured pattern against the application root path.
pub fn join_root_path(root_path: &str, pattern: &str) -> Result<String, ConfigError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(ConfigError::EmptyPathPattern);
    }
    if pattern.starts_with('/') {
        return Ok(pattern.to_string());
    }
    let root = root_path.trim_end_matches('/');
    Ok(format!("{root}/{pattern}"))
}
