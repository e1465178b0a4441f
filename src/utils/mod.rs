//! Utility functions and data structures.
//!
//! ## Modules
//!
//! - [`app_data`] - Configuration file discovery and defaults
//! - [`encoding`] - Little-endian integer reads/writes for the index format
//! - [`progress`] - Progress bars (no-op without the `progress` feature)

pub mod app_data;
pub mod encoding;
pub mod progress;

pub use app_data::*;
pub use encoding::*;
