//! Rolling 24-hour quota tracking.
//!
//! Consumption is counted from the append-only review log: a log row whose
//! snapshot state was `new` consumed the new-card bucket, anything else the
//! review bucket. This read is deliberately not isolated from concurrent
//! review writes; two in-flight submissions can both pass the gate and
//! overshoot a daily limit by a small bounded amount (see DESIGN.md).

use chrono::{Duration, NaiveDateTime};
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::Serialize;

use super::params::UserParams;
use crate::model::{CardState, Deck};
use crate::schema::{cards, review_logs};

/// How far the user has got through today's allowance for one deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyProgress {
    pub new_cards_seen: i64,
    pub new_cards_limit: i64,
    pub reviews_seen: i64,
    pub reviews_limit: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaRemaining {
    pub new_remaining: i64,
    pub review_remaining: i64,
    pub progress: DailyProgress,
}

/// A user's per-day limit scaled by the deck's multiplier, floored, never
/// negative.
pub fn scaled_limit(per_day: i32, daily_scaler: f64) -> i64 {
    ((per_day as f64) * daily_scaler).floor().max(0.0) as i64
}

/// Log rows consumed in the trailing 24 hours for one user+deck, split into
/// (new-card, review) buckets by the snapshot state.
pub fn consumed(
    conn: &mut SqliteConnection,
    user_id: i32,
    deck_id: i32,
    as_of: NaiveDateTime,
) -> Result<(i64, i64), diesel::result::Error> {
    let window_start = as_of - Duration::hours(24);
    let rows: Vec<(CardState, i64)> = review_logs::table
        .inner_join(cards::table)
        .filter(review_logs::user_id.eq(user_id))
        .filter(cards::deck_id.eq(deck_id))
        .filter(review_logs::reviewed_at.ge(window_start))
        .group_by(review_logs::state)
        .select((review_logs::state, count_star()))
        .load(conn)?;

    let mut new_seen = 0;
    let mut review_seen = 0;
    for (state, count) in rows {
        if state == CardState::New {
            new_seen += count;
        } else {
            review_seen += count;
        }
    }
    Ok((new_seen, review_seen))
}

/// Combines observed consumption with the user's scaled limits. Exhausting
/// one bucket does not block the other.
pub fn from_counts(
    params: &UserParams,
    deck: &Deck,
    new_seen: i64,
    review_seen: i64,
) -> QuotaRemaining {
    let new_limit = scaled_limit(params.new_cards_per_day, deck.daily_scaler);
    let review_limit = scaled_limit(params.max_reviews_per_day, deck.daily_scaler);
    QuotaRemaining {
        new_remaining: (new_limit - new_seen).max(0),
        review_remaining: (review_limit - review_seen).max(0),
        progress: DailyProgress {
            new_cards_seen: new_seen,
            new_cards_limit: new_limit,
            reviews_seen: review_seen,
            reviews_limit: review_limit,
        },
    }
}

/// Remaining quota for one user+deck as of the given instant.
pub fn remaining(
    conn: &mut SqliteConnection,
    params: &UserParams,
    deck: &Deck,
    as_of: NaiveDateTime,
) -> Result<QuotaRemaining, diesel::result::Error> {
    let (new_seen, review_seen) = consumed(conn, deck.user_id, deck.deck_id, as_of)?;
    Ok(from_counts(params, deck, new_seen, review_seen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_card, seed_deck, seed_log, seed_user, test_conn, ts};

    fn limits(new: i32, review: i32) -> UserParams {
        UserParams {
            new_cards_per_day: new,
            max_reviews_per_day: review,
            scheduler: Default::default(),
        }
    }

    #[test]
    fn counts_only_rows_inside_the_window() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "q@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let card = seed_card(&mut conn, user, deck.deck_id, CardState::Review);

        let as_of = ts(2024, 3, 10, 12, 0);
        seed_log(&mut conn, card, user, CardState::New, ts(2024, 3, 10, 9, 0));
        seed_log(&mut conn, card, user, CardState::Review, ts(2024, 3, 9, 13, 0));
        // Just outside the trailing 24 hours.
        seed_log(&mut conn, card, user, CardState::New, ts(2024, 3, 9, 11, 0));

        let (new_seen, review_seen) = consumed(&mut conn, user, deck.deck_id, as_of).unwrap();
        assert_eq!(new_seen, 1);
        assert_eq!(review_seen, 1);
    }

    #[test]
    fn scaler_multiplies_and_floors_limits() {
        assert_eq!(scaled_limit(10, 1.5), 15);
        assert_eq!(scaled_limit(5, 0.5), 2);
        assert_eq!(scaled_limit(3, 0.1), 0);
        assert_eq!(scaled_limit(20, 1.0), 20);
    }

    #[test]
    fn buckets_are_independent() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "q2@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let card = seed_card(&mut conn, user, deck.deck_id, CardState::Review);

        let as_of = ts(2024, 3, 10, 12, 0);
        for hour in 0..3 {
            seed_log(&mut conn, card, user, CardState::New, ts(2024, 3, 10, hour, 0));
        }

        let quota = remaining(&mut conn, &limits(3, 10), &deck, as_of).unwrap();
        assert_eq!(quota.new_remaining, 0);
        assert_eq!(quota.review_remaining, 10);
        assert_eq!(quota.progress.new_cards_seen, 3);
        assert_eq!(quota.progress.new_cards_limit, 3);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "q3@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let card = seed_card(&mut conn, user, deck.deck_id, CardState::Review);

        let as_of = ts(2024, 3, 10, 12, 0);
        for hour in 0..5 {
            seed_log(
                &mut conn,
                card,
                user,
                CardState::Review,
                ts(2024, 3, 10, hour, 0),
            );
        }

        let quota = remaining(&mut conn, &limits(10, 2), &deck, as_of).unwrap();
        assert_eq!(quota.review_remaining, 0);
        assert_eq!(quota.progress.reviews_seen, 5);
    }

    #[test]
    fn other_decks_do_not_count() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "q4@example.com");
        let deck_a = seed_deck(&mut conn, user, "A", 1.0);
        let deck_b = seed_deck(&mut conn, user, "B", 1.0);
        let card_b = seed_card(&mut conn, user, deck_b.deck_id, CardState::Review);

        let as_of = ts(2024, 3, 10, 12, 0);
        seed_log(&mut conn, card_b, user, CardState::New, ts(2024, 3, 10, 9, 0));

        let (new_seen, review_seen) = consumed(&mut conn, user, deck_a.deck_id, as_of).unwrap();
        assert_eq!((new_seen, review_seen), (0, 0));
    }
}
