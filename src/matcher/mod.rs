//! Path matching subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     (pattern, value)[]
//!     → path.rs (parse: exact / prefix / inner wildcard)
//!     → substring.rs (freeze keys into open-addressed tables)
//!     → PathMatcher (immutable, shared via Arc)
//!
//! Per request:
//!     request path → exact table → prefix lengths (longest first)
//!         → nested matcher for inner wildcards → default value
//! ```
//!
//! # Design Decisions
//! - Built once, never mutated: lock-free concurrent reads
//! - Lookups never allocate; candidate keys are `path[..len]` slices
//! - Absence of a rule is a value (`None`), not an error

pub mod path;
pub mod substring;

pub use path::{Accumulator, PathMatch, PathMatcher, PathMatcherBuilder};
pub use substring::{SubstringMap, SubstringMatch};
