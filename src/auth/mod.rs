//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Request headers
//!     → authenticator.rs (priority order, optional scheme restriction)
//!     → mechanism (bearer.rs / header.rs / custom)
//!     → SecurityIdentity (identity.rs), or anonymous
//!
//! Unauthenticated and denied:
//!     → mechanism challenge (401 + WWW-Authenticate, or 302 redirect)
//! ```
//!
//! # Design Decisions
//! - Authentication is lazy by default: `LazyIdentity` runs it on first use
//! - "No credential" (`Ok(None)`) is distinct from "bad credential" (`Err`)

pub mod authenticator;
pub mod bearer;
pub mod header;
pub mod identity;
pub mod mechanism;

pub use authenticator::Authenticator;
pub use bearer::BearerTokenMechanism;
pub use header::TrustedHeaderMechanism;
pub use identity::{LazyIdentity, Permission, SecurityIdentity};
pub use mechanism::{AuthenticationMechanism, ChallengeData, CredentialTransport, TransportType};
