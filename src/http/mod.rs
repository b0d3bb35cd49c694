//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower-http layers)
//!     → request ID (set if absent, propagated to the response)
//!     → middleware/access_control.rs (authenticate + authorize)
//!     → route handler (/whoami, echo)
//!         → endpoint-level permissions (applies_to = "subset")
//!     → Send to client
//! ```

pub mod middleware;
pub mod server;

pub use server::HttpServer;
