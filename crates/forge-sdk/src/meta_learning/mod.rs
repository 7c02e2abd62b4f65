//! Meta-Learning
//!
//! Picks the learning strategy for each request from per-domain strategy
//! statistics, balancing past performance against exploration.

mod selector;

pub use selector::{MetaLearningSelector, StrategyParams, StrategyScore, StrategySelection};
