//! Path- and method-based access control for HTTP services.

pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod lifecycle;
pub mod matcher;
pub mod observability;

pub use auth::{Authenticator, LazyIdentity, SecurityIdentity};
pub use authz::{HttpSecurity, RequestContext};
pub use config::schema::GuardConfig;
pub use error::{AuthError, AuthzError, ConfigError};
pub use guard::{AccessGuard, Decision, GuardOptions};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use matcher::PathMatcher;
