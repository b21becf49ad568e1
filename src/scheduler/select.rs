//! Candidate selection: which cards may be reviewed right now.
//!
//! The eligible pool is new cards plus cards whose due date has passed, each
//! group capped by its own quota bucket. Single-card draws pick uniformly at
//! random among ties; list draws order due cards by due date and new cards
//! by creation, due first.

use chrono::NaiveDateTime;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::BigInt;

use super::fsrs::{self, MemoryState, ReviewMetrics};
use super::params::UserParams;
use super::quota::{self, DailyProgress};
use crate::errors::AppError;
use crate::model::{Card, CardState, Deck};
use crate::schema::cards;

#[derive(Debug)]
pub struct Candidate {
    pub card: Card,
    pub metrics: ReviewMetrics,
}

#[derive(Debug)]
pub enum Selection {
    Cards {
        candidates: Vec<Candidate>,
        progress: DailyProgress,
    },
    AllCaughtUp {
        progress: DailyProgress,
        total_cards: i64,
    },
    EmptyDeck,
}

/// Draws up to `count` reviewable cards from `deck`, honoring due dates and
/// the remaining daily quota, and attaches projected due dates for all four
/// ratings to each.
pub fn select(
    conn: &mut SqliteConnection,
    params: &UserParams,
    deck: &Deck,
    count: i64,
    as_of: NaiveDateTime,
) -> Result<Selection, AppError> {
    let total_cards: i64 = cards::table
        .filter(cards::deck_id.eq(deck.deck_id))
        .filter(cards::user_id.eq(deck.user_id))
        .count()
        .get_result(conn)?;
    if total_cards == 0 {
        return Ok(Selection::EmptyDeck);
    }

    let quota = quota::remaining(conn, params, deck, as_of)?;
    let picked = if count <= 1 {
        draw_one(conn, deck, &quota, as_of)?
    } else {
        draw_many(conn, deck, &quota, count, as_of)?
    };

    if picked.is_empty() {
        return Ok(Selection::AllCaughtUp {
            progress: quota.progress,
            total_cards,
        });
    }

    let mut candidates = Vec::with_capacity(picked.len());
    for card in picked {
        let metrics = fsrs::project(&MemoryState::of_card(&card), &params.scheduler, as_of)?;
        candidates.push(Candidate { card, metrics });
    }
    Ok(Selection::Cards {
        candidates,
        progress: quota.progress,
    })
}

/// Uniform-random pick among the eligible pool, restricted to the buckets
/// that still have quota.
fn draw_one(
    conn: &mut SqliteConnection,
    deck: &Deck,
    quota: &quota::QuotaRemaining,
    as_of: NaiveDateTime,
) -> Result<Vec<Card>, AppError> {
    let new_open = quota.new_remaining > 0;
    let review_open = quota.review_remaining > 0;
    if !new_open && !review_open {
        return Ok(Vec::new());
    }

    let mut pool = cards::table
        .filter(cards::deck_id.eq(deck.deck_id))
        .filter(cards::user_id.eq(deck.user_id))
        .into_boxed();
    pool = match (new_open, review_open) {
        (true, true) => pool.filter(
            cards::state
                .eq(CardState::New)
                .or(cards::state.ne(CardState::New).and(cards::due.le(as_of))),
        ),
        (true, false) => pool.filter(cards::state.eq(CardState::New)),
        (false, true) => pool.filter(cards::state.ne(CardState::New).and(cards::due.le(as_of))),
        (false, false) => unreachable!(),
    };

    Ok(pool
        .order(sql::<BigInt>("RANDOM()"))
        .first::<Card>(conn)
        .optional()?
        .into_iter()
        .collect())
}

/// Due cards ascending by due date, then new cards ascending by creation,
/// each capped by its bucket, the whole list truncated to `count`.
fn draw_many(
    conn: &mut SqliteConnection,
    deck: &Deck,
    quota: &quota::QuotaRemaining,
    count: i64,
    as_of: NaiveDateTime,
) -> Result<Vec<Card>, AppError> {
    let mut picked: Vec<Card> = Vec::new();

    let due_cap = count.min(quota.review_remaining);
    if due_cap > 0 {
        let due_cards: Vec<Card> = cards::table
            .filter(cards::deck_id.eq(deck.deck_id))
            .filter(cards::user_id.eq(deck.user_id))
            .filter(cards::state.ne(CardState::New))
            .filter(cards::due.le(as_of))
            .order(cards::due.asc())
            .limit(due_cap)
            .load(conn)?;
        picked.extend(due_cards);
    }

    let new_cap = (count - picked.len() as i64).min(quota.new_remaining);
    if new_cap > 0 {
        let new_cards: Vec<Card> = cards::table
            .filter(cards::deck_id.eq(deck.deck_id))
            .filter(cards::user_id.eq(deck.user_id))
            .filter(cards::state.eq(CardState::New))
            .order(cards::card_id.asc())
            .limit(new_cap)
            .load(conn)?;
        picked.extend(new_cards);
    }

    Ok(picked)
}
