//! # ECL Testkit
//!
//! Test utilities for the external changelog.
//!
//! This crate provides:
//! - Test fixtures: CSN generation, update message builders and a
//!   populated changelog with its backend
//! - Property-based test generators using proptest
//! - Concurrent writer helpers for persistent search tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ecl_testkit::prelude::*;
//!
//! #[test]
//! fn draft_search() {
//!     let changelog = TestChangelog::new();
//!     changelog.add_change("o=a", 1);
//!     let entries = changelog.search(changelog_request()).unwrap();
//!     assert_eq!(change_numbers(&entries), vec![1]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
