//! The review submission pipeline: fetch, validate, quota gate, update,
//! paired write.
//!
//! The card update and its log row commit in one transaction; a failure
//! leaves neither. The quota gate itself is a separate read (see
//! `quota`), so concurrent submissions can overshoot a limit slightly.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;

use super::fsrs::{self, MemoryState, Rating};
use super::params::UserParams;
use super::quota::{self, DailyProgress};
use crate::errors::AppError;
use crate::model::{Card, CardState, Deck, NewReviewLog};
use crate::schema::{cards, decks, review_logs};

#[derive(Debug)]
pub enum ReviewOutcome {
    Reviewed { card: Card },
    /// A normal outcome, not a failure: the relevant quota bucket is spent.
    DailyLimitReached { progress: DailyProgress },
}

pub fn submit_review(
    conn: &mut SqliteConnection,
    params: &UserParams,
    user_id: i32,
    card_id: i32,
    rating_value: i32,
    reviewed_at: Option<NaiveDateTime>,
) -> Result<ReviewOutcome, AppError> {
    let card: Card = cards::table
        .find(card_id)
        .first(conn)
        .optional()?
        .ok_or(AppError::NotFound)?;
    if card.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let rating = Rating::try_from(rating_value)?;
    let now = reviewed_at.unwrap_or_else(|| Utc::now().naive_utc());

    let deck: Deck = decks::table.find(card.deck_id).first(conn)?;
    let gate = quota::remaining(conn, params, &deck, now)?;
    let open = if card.state == CardState::New {
        gate.new_remaining
    } else {
        gate.review_remaining
    };
    if open <= 0 {
        return Ok(ReviewOutcome::DailyLimitReached {
            progress: gate.progress,
        });
    }

    let prior = MemoryState::of_card(&card);
    let next = fsrs::next_state(&prior, rating, &params.scheduler, now, card.card_id as u64)?;

    let updated = conn.transaction::<Card, diesel::result::Error, _>(|conn| {
        diesel::update(cards::table.find(card.card_id))
            .set((
                cards::state.eq(next.state),
                cards::due.eq(next.due),
                cards::stability.eq(next.stability),
                cards::difficulty.eq(next.difficulty),
                cards::elapsed_days.eq(next.elapsed_days),
                cards::scheduled_days.eq(next.scheduled_days),
                cards::reps.eq(next.reps),
                cards::lapses.eq(next.lapses),
                cards::last_review.eq(next.last_review),
            ))
            .execute(conn)?;

        diesel::insert_into(review_logs::table)
            .values(&NewReviewLog {
                card_id: card.card_id,
                user_id,
                rating: rating_value,
                state: prior.state,
                due: prior.due,
                stability: prior.stability,
                difficulty: prior.difficulty,
                elapsed_days: next.elapsed_days,
                last_elapsed_days: prior.elapsed_days,
                scheduled_days: prior.scheduled_days,
                reviewed_at: now,
            })
            .execute(conn)?;

        cards::table.find(card.card_id).first(conn)
    })?;

    Ok(ReviewOutcome::Reviewed { card: updated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReviewLog;
    use crate::test_support::{
        get_card, seed_card, seed_card_due, seed_deck, seed_log, seed_user, test_conn, ts,
    };

    fn limits(new: i32, review: i32) -> UserParams {
        UserParams {
            new_cards_per_day: new,
            max_reviews_per_day: review,
            scheduler: Default::default(),
        }
    }

    fn logs_for(conn: &mut SqliteConnection, card_id: i32) -> Vec<ReviewLog> {
        review_logs::table
            .filter(review_logs::card_id.eq(card_id))
            .order(review_logs::log_id.asc())
            .select(ReviewLog::as_select())
            .load(conn)
            .unwrap()
    }

    #[test]
    fn first_good_review_updates_card_and_appends_one_log() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "p@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let card_id = seed_card(&mut conn, user, deck.deck_id, CardState::New);
        let now = ts(2024, 3, 10, 12, 0);

        let outcome =
            submit_review(&mut conn, &limits(10, 10), user, card_id, 3, Some(now)).unwrap();
        let card = match outcome {
            ReviewOutcome::Reviewed { card } => card,
            other => panic!("expected a review, got {other:?}"),
        };

        assert_eq!(card.reps, 1);
        assert_eq!(card.lapses, 0);
        assert_ne!(card.state, CardState::New);
        assert!(card.due.unwrap() > now);

        let logs = logs_for(&mut conn, card_id);
        assert_eq!(logs.len(), 1);
        // The log snapshots the card as it stood before the update.
        assert_eq!(logs[0].state, CardState::New);
        assert_eq!(logs[0].due, None);
        assert_eq!(logs[0].stability, 0.0);
        assert_eq!(logs[0].rating, 3);
        assert_eq!(logs[0].reviewed_at, now);
    }

    #[test]
    fn state_and_due_stay_consistent_after_every_review() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "p2@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let card_id = seed_card(&mut conn, user, deck.deck_id, CardState::New);

        let mut at = ts(2024, 3, 10, 12, 0);
        for rating in [3, 1, 3, 4] {
            submit_review(&mut conn, &limits(50, 50), user, card_id, rating, Some(at)).unwrap();
            let card = get_card(&mut conn, card_id);
            assert_ne!(card.state, CardState::New);
            assert!(card.due.is_some());
            at = card.due.unwrap() + chrono::Duration::hours(1);
        }
    }

    #[test]
    fn again_on_a_review_card_increments_lapses_once() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "p3@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let card_id = seed_card_due(&mut conn, user, deck.deck_id, ts(2024, 3, 9, 0, 0));
        let before = get_card(&mut conn, card_id);

        let outcome = submit_review(
            &mut conn,
            &limits(10, 10),
            user,
            card_id,
            1,
            Some(ts(2024, 3, 10, 12, 0)),
        )
        .unwrap();
        let card = match outcome {
            ReviewOutcome::Reviewed { card } => card,
            other => panic!("expected a review, got {other:?}"),
        };
        assert_eq!(card.lapses, before.lapses + 1);
        assert_eq!(card.state, CardState::Relearning);
    }

    #[test]
    fn exhausted_bucket_returns_daily_limit_without_touching_anything() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "p4@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let card_id = seed_card(&mut conn, user, deck.deck_id, CardState::New);
        let spent = seed_card_due(&mut conn, user, deck.deck_id, ts(2024, 3, 9, 0, 0));
        seed_log(&mut conn, spent, user, CardState::New, ts(2024, 3, 10, 8, 0));

        let before = get_card(&mut conn, card_id);
        let outcome = submit_review(
            &mut conn,
            &limits(1, 10),
            user,
            card_id,
            3,
            Some(ts(2024, 3, 10, 12, 0)),
        )
        .unwrap();
        match outcome {
            ReviewOutcome::DailyLimitReached { progress } => {
                assert_eq!(progress.new_cards_seen, progress.new_cards_limit);
            }
            other => panic!("expected the daily limit, got {other:?}"),
        }

        let after = get_card(&mut conn, card_id);
        assert_eq!(after.state, before.state);
        assert_eq!(after.reps, before.reps);
        assert_eq!(logs_for(&mut conn, card_id).len(), 0);
    }

    #[test]
    fn new_bucket_exhaustion_does_not_block_due_reviews() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "p5@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let due = seed_card_due(&mut conn, user, deck.deck_id, ts(2024, 3, 9, 0, 0));
        seed_log(&mut conn, due, user, CardState::New, ts(2024, 3, 10, 8, 0));

        let outcome = submit_review(
            &mut conn,
            &limits(1, 10),
            user,
            due,
            3,
            Some(ts(2024, 3, 10, 12, 0)),
        )
        .unwrap();
        assert!(matches!(outcome, ReviewOutcome::Reviewed { .. }));
    }

    #[test]
    fn unknown_card_is_not_found_and_foreign_card_is_forbidden() {
        let mut conn = test_conn();
        let owner = seed_user(&mut conn, "p6@example.com");
        let intruder = seed_user(&mut conn, "p7@example.com");
        let deck = seed_deck(&mut conn, owner, "Deck", 1.0);
        let card_id = seed_card(&mut conn, owner, deck.deck_id, CardState::New);

        let missing = submit_review(&mut conn, &limits(10, 10), owner, 9999, 3, None);
        assert!(matches!(missing, Err(AppError::NotFound)));

        let foreign = submit_review(&mut conn, &limits(10, 10), intruder, card_id, 3, None);
        assert!(matches!(foreign, Err(AppError::Forbidden)));
        assert_eq!(logs_for(&mut conn, card_id).len(), 0);
    }

    #[test]
    fn invalid_rating_is_rejected_before_any_mutation() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "p8@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let card_id = seed_card(&mut conn, user, deck.deck_id, CardState::New);

        let err = submit_review(&mut conn, &limits(10, 10), user, card_id, 0, None).unwrap_err();
        assert!(matches!(err, AppError::InvalidRating(0)));
        assert_eq!(get_card(&mut conn, card_id).state, CardState::New);
        assert_eq!(logs_for(&mut conn, card_id).len(), 0);
    }

    #[test]
    fn second_review_snapshots_the_state_left_by_the_first() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn, "p9@example.com");
        let deck = seed_deck(&mut conn, user, "Deck", 1.0);
        let card_id = seed_card(&mut conn, user, deck.deck_id, CardState::New);

        submit_review(&mut conn, &limits(10, 10), user, card_id, 3, Some(ts(2024, 3, 10, 12, 0)))
            .unwrap();
        let between = get_card(&mut conn, card_id);
        submit_review(&mut conn, &limits(10, 10), user, card_id, 3, Some(ts(2024, 3, 12, 12, 0)))
            .unwrap();

        let logs = logs_for(&mut conn, card_id);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].state, between.state);
        assert_eq!(logs[1].due, between.due);
        assert_eq!(logs[1].stability, between.stability);
        assert_eq!(logs[1].last_elapsed_days, between.elapsed_days);
    }
}
