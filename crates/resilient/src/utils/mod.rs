//! Shared helpers
//!
//! - **[`macros`]**: `Display`/`FromStr` for policy enums
//! - **[`serde`]**: seconds-based duration fields for settings files

#[macro_use]
pub mod macros;
pub mod serde;

pub use self::serde::{duration_secs, option_duration_secs};
