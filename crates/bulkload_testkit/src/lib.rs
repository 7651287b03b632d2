//! # Bulkload Testkit
//!
//! Test utilities for the bulk-load engine lifecycle.
//!
//! This crate provides:
//! - A fault-injecting backend wrapper that records every call
//! - Fixtures for tables, rows and encoded chunks
//! - Property-based test generators using proptest
//! - Concurrent lifecycle stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bulkload_testkit::prelude::*;
//!
//! #[test]
//! fn import_survives_one_timeout() {
//!     let faulty = FaultyBackend::new(InMemoryBackend::new());
//!     faulty.fail_next(BackendOp::Import, Fault::Retryable, 1);
//!     // ... drive an engine through the facade
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use bulkload_backend::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
