//! Test helpers
//!
//! - **[`assertions`]**: failure-message, attempt-count and delay assertions
//! - **[`mocks`]**: scripted operations that count their invocations
//! - **[`temp`]**: temporary settings files (`test-utils` feature)
//! - [`MockClock`] for driving circuit windows and token refill by hand
//!
//! ```rust
//! use resilient::testing::{ScriptedOperation, Step};
//!
//! let op = ScriptedOperation::new([Step::Fail("transient".into()), Step::Succeed(1)]);
//! assert!(op.call().is_err());
//! assert_eq!(op.call().ok(), Some(1));
//! ```

pub mod assertions;
pub mod mocks;
#[cfg(any(feature = "test-utils", test))]
pub mod temp;

pub use assertions::{assert_duration_in_range, assert_jittered};
pub use mocks::{ScriptedOperation, Step};
#[cfg(any(feature = "test-utils", test))]
pub use temp::settings_file;

pub use crate::resilience::{Clock, MockClock, SystemClock};
