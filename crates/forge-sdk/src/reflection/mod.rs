//! Reflection
//!
//! Periodic passes over the attempt history that emit insights:
//!
//! ```text
//!   tactical   latest attempt below threshold ──▶ missing feature / factor
//!   strategic  recent window vs earlier window ──▶ improving | declining
//!   meta       did past insights help? ──────────▶ raise | lower threshold
//! ```
//!
//! Every insight carries confidence (evidence size × consistency) and impact
//! (|Δquality| / 20). Insights below the confidence threshold are discarded.

mod analysis;
mod cycle;

pub use cycle::{InsightDigest, ReflectionCycle, ReflectionSummary};
