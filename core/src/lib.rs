//! # Nova Core
//!
//! Engine-agnostic building blocks shared by the Nova renderer crates:
//! the cooperative task scheduler and profiling instrumentation.

pub mod compute;
pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
