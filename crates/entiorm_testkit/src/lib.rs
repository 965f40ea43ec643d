//! # entiorm testkit
//!
//! Shared fixtures for testing entiorm across every backend.
//!
//! This crate provides:
//! - Test entities with mapping providers ([`TestTable`] and friends)
//! - Recording and stamping callbacks
//! - [`TestBackend`], the backend matrix, with temporary databases
//! - proptest generators for [`TestTable`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entiorm_testkit::prelude::*;
//!
//! #[test]
//! fn saves_everywhere() {
//!     for backend in TestBackend::all() {
//!         let factory = backend.factory();
//!         let mut context = factory.create_context().unwrap();
//!         // ... test operations
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backends;
pub mod callbacks;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backends::*;
    pub use crate::callbacks::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use backends::*;
pub use callbacks::*;
pub use fixtures::*;
pub use generators::*;
