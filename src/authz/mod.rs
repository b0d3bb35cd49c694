//! Authorization subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     config / HttpSecurity → permission.rs (HttpPermission[])
//!     → registry.rs (named policies resolved)
//!     → index.rs (PermissionIndex, immutable)
//!
//! Per request:
//!     (path, method) → index.rs → Resolution
//!         NoRule      → default policy
//!         Policies    → chain.rs (sequential, short-circuit on deny)
//!                         → policy.rs (check_permission with LazyIdentity)
//!     → CheckResult (permitted + optional augmented identity)
//! ```
//!
//! # Design Decisions
//! - The index is read-only after startup and shared across requests
//! - Per-request state travels in an explicit `RequestContext` (context.rs)

pub mod chain;
pub mod context;
pub mod index;
pub mod permission;
pub mod policy;
pub mod registry;

pub use chain::{evaluate, run_blocking};
pub use context::RequestContext;
pub use index::{PermissionIndex, Resolution, ResolvedPolicies};
pub use permission::{AppliesTo, HttpPermission, HttpSecurity, PermissionBuilder};
pub use policy::{
    AuthenticatedPolicy, CheckResult, DenyPolicy, PermissionsPolicy, PermitPolicy, PolicyRef, PredicatePolicy,
    RolesAllowedPolicy, SecurityPolicy,
};
pub use registry::PolicyRegistry;
