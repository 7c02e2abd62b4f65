//! SDK Utilities
//!
//! Common utilities for the SDK.

mod hashing;
mod time;

pub use hashing::{content_hash, short_hash};
pub use time::{elapsed_intervals, format_datetime};
