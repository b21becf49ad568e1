//! The review scheduling engine.
//!
//! `fsrs` is the pure memory-model updater; everything else reads or writes
//! the durable store: `quota` counts the rolling 24-hour window, `select`
//! picks reviewable cards, `stats` aggregates per-deck counts in bulk, and
//! `pipeline` runs a review submission end to end. `params` holds the
//! per-user algorithm parameters and their cache.

pub mod fsrs;
pub mod params;
pub mod pipeline;
pub mod quota;
pub mod select;
pub mod stats;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("invalid rating: {0}")]
    InvalidRating(i32),
    #[error("invalid prior memory state: {0}")]
    InvalidPriorState(String),
}
