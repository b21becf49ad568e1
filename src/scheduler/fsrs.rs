//! Pure memory-model updater.
//!
//! Given a card's prior memory state, a rating and the user's algorithm
//! parameters, computes the fully populated next state. No side effects, so
//! the same function serves both real submissions and the speculative
//! projections behind review metrics.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use super::SchedulerError;
use super::params::SchedulerParams;
use crate::model::CardState;

/// Exponent of the forgetting curve.
const DECAY: f64 = -0.5;
/// Chosen so that retrievability is exactly 0.9 when elapsed == stability.
const FACTOR: f64 = 19.0 / 81.0;

const MIN_STABILITY: f64 = 0.1;
const MIN_DIFFICULTY: f64 = 1.0;
const MAX_DIFFICULTY: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    fn grade(self) -> f64 {
        self as i32 as f64
    }
}

impl TryFrom<i32> for Rating {
    type Error = SchedulerError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rating::Again),
            2 => Ok(Rating::Hard),
            3 => Ok(Rating::Good),
            4 => Ok(Rating::Easy),
            other => Err(SchedulerError::InvalidRating(other)),
        }
    }
}

/// The scheduling fields of a card, detached from its content.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryState {
    pub state: CardState,
    pub due: Option<NaiveDateTime>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub reps: i32,
    pub lapses: i32,
    pub last_review: Option<NaiveDateTime>,
}

impl MemoryState {
    /// The scheduling fields of a persisted card.
    pub fn of_card(card: &crate::model::Card) -> Self {
        MemoryState {
            state: card.state,
            due: card.due,
            stability: card.stability,
            difficulty: card.difficulty,
            elapsed_days: card.elapsed_days,
            scheduled_days: card.scheduled_days,
            reps: card.reps,
            lapses: card.lapses,
            last_review: card.last_review,
        }
    }

    /// State of a card that has never been reviewed.
    pub fn fresh() -> Self {
        MemoryState {
            state: CardState::New,
            due: None,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            last_review: None,
        }
    }
}

/// Projected due dates for each of the four ratings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewMetrics {
    pub again: NaiveDateTime,
    pub hard: NaiveDateTime,
    pub good: NaiveDateTime,
    pub easy: NaiveDateTime,
}

/// Computes the next memory state for `prior` after a review with `rating`
/// at `now`. `seed` keys the fuzz window so a given card perturbs its
/// intervals reproducibly.
pub fn next_state(
    prior: &MemoryState,
    rating: Rating,
    params: &SchedulerParams,
    now: NaiveDateTime,
    seed: u64,
) -> Result<MemoryState, SchedulerError> {
    validate_prior(prior)?;

    let w = &params.weights;
    let mut next = prior.clone();
    next.reps = prior.reps + 1;
    next.last_review = Some(now);

    if prior.state == CardState::New {
        next.lapses = 0;
        next.elapsed_days = 0;
        next.stability = init_stability(w, rating);
        next.difficulty = init_difficulty(w, rating);

        if params.enable_short_term && rating != Rating::Easy {
            next.state = CardState::Learning;
            learning_step(&mut next, rating, now);
        } else {
            next.state = CardState::Review;
            schedule_review(&mut next, params, now, seed);
        }
        return Ok(next);
    }

    let elapsed = elapsed_days(prior.last_review, now);
    let retention = retrievability(elapsed, prior.stability);

    next.elapsed_days = elapsed.floor() as i32;
    next.difficulty = next_difficulty(w, prior.difficulty, rating);
    next.stability = if params.enable_short_term && elapsed < 1.0 {
        short_term_stability(w, prior.stability, rating)
    } else if rating == Rating::Again {
        next_forget_stability(w, prior.difficulty, prior.stability, retention)
    } else {
        next_recall_stability(w, prior.difficulty, prior.stability, retention, rating)
    };

    match (prior.state, rating) {
        (CardState::Review, Rating::Again) => {
            next.lapses = prior.lapses + 1;
            next.state = CardState::Relearning;
            if params.enable_short_term {
                learning_step(&mut next, rating, now);
            } else {
                schedule_review(&mut next, params, now, seed);
            }
        }
        (CardState::Review, _) => {
            schedule_review(&mut next, params, now, seed);
        }
        (CardState::Learning | CardState::Relearning, Rating::Again) => {
            if params.enable_short_term {
                learning_step(&mut next, rating, now);
            } else {
                schedule_review(&mut next, params, now, seed);
            }
        }
        (CardState::Learning | CardState::Relearning, _) => {
            let graduates = !params.enable_short_term
                || rating == Rating::Easy
                || next.stability >= graduation_threshold(params.request_retention);
            if graduates {
                next.state = CardState::Review;
                schedule_review(&mut next, params, now, seed);
            } else {
                learning_step(&mut next, rating, now);
            }
        }
        (CardState::New, _) => unreachable!("handled above"),
    }

    Ok(next)
}

/// Projects the due date for all four ratings without persisting anything.
/// Fuzz is disabled so the projections stay monotone in the rating.
pub fn project(
    prior: &MemoryState,
    params: &SchedulerParams,
    now: NaiveDateTime,
) -> Result<ReviewMetrics, SchedulerError> {
    let calm = SchedulerParams {
        enable_fuzz: false,
        ..params.clone()
    };
    let mut dues = [now; 4];
    for (slot, rating) in dues.iter_mut().zip(Rating::ALL) {
        let projected = next_state(prior, rating, &calm, now, 0)?;
        *slot = projected
            .due
            .expect("a reviewed card always has a due date");
    }
    Ok(ReviewMetrics {
        again: dues[0],
        hard: dues[1],
        good: dues[2],
        easy: dues[3],
    })
}

fn validate_prior(prior: &MemoryState) -> Result<(), SchedulerError> {
    if !prior.stability.is_finite() || prior.stability < 0.0 {
        return Err(SchedulerError::InvalidPriorState(format!(
            "stability {} out of range",
            prior.stability
        )));
    }
    if !prior.difficulty.is_finite() || prior.difficulty < 0.0 {
        return Err(SchedulerError::InvalidPriorState(format!(
            "difficulty {} out of range",
            prior.difficulty
        )));
    }
    match prior.state {
        CardState::New => {
            if prior.due.is_some() {
                return Err(SchedulerError::InvalidPriorState(
                    "new card with a due date".into(),
                ));
            }
        }
        _ => {
            if prior.last_review.is_none() {
                return Err(SchedulerError::InvalidPriorState(
                    "reviewed card without a last review".into(),
                ));
            }
            if prior.due.is_none() {
                return Err(SchedulerError::InvalidPriorState(
                    "reviewed card without a due date".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Retention probability after `elapsed` days at the given stability.
pub fn retrievability(elapsed: f64, stability: f64) -> f64 {
    let stability = stability.max(MIN_STABILITY);
    (1.0 + FACTOR * elapsed.max(0.0) / stability).powf(DECAY)
}

/// Interval (whole days) at which predicted retention drops to the target.
fn next_interval(stability: f64, params: &SchedulerParams) -> i32 {
    let raw = stability / FACTOR * (params.request_retention.powf(1.0 / DECAY) - 1.0);
    (raw.round() as i32).clamp(1, params.maximum_interval)
}

/// Stability above which the interval solver yields at least one day; a
/// learning card graduates to review once it crosses this.
fn graduation_threshold(request_retention: f64) -> f64 {
    FACTOR / (request_retention.powf(1.0 / DECAY) - 1.0)
}

fn init_stability(w: &[f64; 19], rating: Rating) -> f64 {
    w[rating as i32 as usize - 1].max(MIN_STABILITY)
}

fn init_difficulty(w: &[f64; 19], rating: Rating) -> f64 {
    (w[4] - (w[5] * (rating.grade() - 1.0)).exp() + 1.0).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn next_difficulty(w: &[f64; 19], difficulty: f64, rating: Rating) -> f64 {
    let delta = -w[6] * (rating.grade() - 3.0);
    let damped = difficulty + delta * (MAX_DIFFICULTY - difficulty) / 9.0;
    let reverted = w[7] * init_difficulty(w, Rating::Easy) + (1.0 - w[7]) * damped;
    reverted.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn next_recall_stability(
    w: &[f64; 19],
    difficulty: f64,
    stability: f64,
    retention: f64,
    rating: Rating,
) -> f64 {
    let stability = stability.max(MIN_STABILITY);
    let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
    let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };
    stability
        * (1.0
            + w[8].exp()
                * (11.0 - difficulty)
                * stability.powf(-w[9])
                * ((w[10] * (1.0 - retention)).exp() - 1.0)
                * hard_penalty
                * easy_bonus)
}

fn next_forget_stability(w: &[f64; 19], difficulty: f64, stability: f64, retention: f64) -> f64 {
    let fallback = w[11]
        * difficulty.powf(-w[12])
        * ((stability.max(MIN_STABILITY) + 1.0).powf(w[13]) - 1.0)
        * (w[14] * (1.0 - retention)).exp();
    fallback.clamp(MIN_STABILITY, stability.max(MIN_STABILITY))
}

fn short_term_stability(w: &[f64; 19], stability: f64, rating: Rating) -> f64 {
    (stability.max(MIN_STABILITY) * (w[17] * (rating.grade() - 3.0 + w[18])).exp())
        .max(MIN_STABILITY)
}

/// Sub-day retry for cards still in a learning phase.
fn learning_step(next: &mut MemoryState, rating: Rating, now: NaiveDateTime) {
    let minutes = match rating {
        Rating::Again if next.reps == 1 => 1,
        Rating::Again => 5,
        Rating::Hard => 5,
        _ => 10,
    };
    next.scheduled_days = 0;
    next.due = Some(now + Duration::minutes(minutes));
}

fn schedule_review(next: &mut MemoryState, params: &SchedulerParams, now: NaiveDateTime, seed: u64) {
    let mut interval = next_interval(next.stability, params);
    if params.enable_fuzz {
        interval = apply_fuzz(interval, params.maximum_interval, seed, next.reps);
    }
    next.scheduled_days = interval;
    next.due = Some(now + Duration::days(interval as i64));
}

/// Perturbs an interval inside a banded window so due dates do not cluster.
/// Deterministic for a given (seed, reps) pair; never yields less than two
/// days, so a fuzzed due date can never land before tomorrow.
fn apply_fuzz(interval: i32, maximum_interval: i32, seed: u64, reps: i32) -> i32 {
    let ivl = interval as f64;
    if ivl < 2.5 {
        return interval;
    }
    let mut delta = 1.0;
    delta += 0.15 * (ivl.min(7.0) - 2.5).max(0.0);
    delta += 0.10 * (ivl.min(20.0) - 7.0).max(0.0);
    delta += 0.05 * (ivl - 20.0).max(0.0);

    let min_ivl = ((ivl - delta).round() as i32).max(2);
    let max_ivl = ((ivl + delta).round() as i32).min(maximum_interval);
    if min_ivl >= max_ivl {
        return max_ivl.max(min_ivl.min(interval));
    }
    let span = (max_ivl - min_ivl + 1) as u64;
    min_ivl + (splitmix64(seed ^ (reps as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)) % span) as i32
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

fn elapsed_days(last_review: Option<NaiveDateTime>, now: NaiveDateTime) -> f64 {
    match last_review {
        Some(last) => ((now - last).num_seconds() as f64 / 86_400.0).max(0.0),
        None => 0.0,
    }
}
