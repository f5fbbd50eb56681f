//! Shared test utilities for loopwatch.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`mock`] - Alert sinks and thread spawners for exercising the watchdog
//! - [`prelude`] - Convenience re-exports
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! loopwatch-test-helpers = { workspace = true }
//! ```
//!
//! ```rust,ignore
//! use loopwatch_test_helpers::prelude::*;
//! ```

pub mod mock;
pub mod must;
pub mod prelude;

pub use must::*;
