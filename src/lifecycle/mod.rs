//! Process lifecycle.
//!
//! ```text
//! SIGTERM / SIGINT (signals.rs)
//!     → Shutdown::trigger (shutdown.rs, broadcast to subscribers)
//!     → HttpServer stops accepting
//!     → in-flight requests drain until the grace period ends
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
