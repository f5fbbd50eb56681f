//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use loopwatch_test_helpers::prelude::*;
//! ```

pub use crate::mock::{
    BlockingSink, CountingSpawner, FailingSink, PanickingSpawner, RecordingSink,
};
pub use crate::must::{must, must_some, must_with};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
