//! Batch per-deck statistics.
//!
//! One grouped pass over `cards` and one over `review_logs` cover any number
//! of decks; the per-deck results are required to match the single-deck
//! counting logic exactly (the optimization must not change semantics).

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Timestamp};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeckCounts {
    pub total: i64,
    pub new: i64,
    pub due: i64,
    pub new_seen_24h: i64,
    pub review_seen_24h: i64,
}

#[derive(QueryableByName)]
struct CardCountsRow {
    #[diesel(sql_type = Integer)]
    deck_id: i32,
    #[diesel(sql_type = BigInt)]
    total: i64,
    #[diesel(sql_type = BigInt)]
    new_count: i64,
    #[diesel(sql_type = BigInt)]
    due_count: i64,
}

#[derive(QueryableByName)]
struct LogCountsRow {
    #[diesel(sql_type = Integer)]
    deck_id: i32,
    #[diesel(sql_type = BigInt)]
    new_seen: i64,
    #[diesel(sql_type = BigInt)]
    review_seen: i64,
}

/// Total/new/due card counts and trailing-24h review counts for every
/// requested deck, in two aggregation queries regardless of deck count.
/// Decks without cards or recent reviews come back zeroed.
pub fn batch_stats(
    conn: &mut SqliteConnection,
    user_id: i32,
    deck_ids: &[i32],
    as_of: NaiveDateTime,
) -> Result<HashMap<i32, DeckCounts>, diesel::result::Error> {
    let mut stats: HashMap<i32, DeckCounts> = deck_ids
        .iter()
        .map(|id| (*id, DeckCounts::default()))
        .collect();

    let card_rows: Vec<CardCountsRow> = diesel::sql_query(
        "SELECT c.deck_id AS deck_id, \
                COUNT(*) AS total, \
                SUM(CASE WHEN c.state = 'new' THEN 1 ELSE 0 END) AS new_count, \
                SUM(CASE WHEN c.state <> 'new' AND c.due <= ? THEN 1 ELSE 0 END) AS due_count \
         FROM cards c \
         WHERE c.user_id = ? \
         GROUP BY c.deck_id",
    )
    .bind::<Timestamp, _>(as_of)
    .bind::<Integer, _>(user_id)
    .load(conn)?;

    for row in card_rows {
        if let Some(entry) = stats.get_mut(&row.deck_id) {
            entry.total = row.total;
            entry.new = row.new_count;
            entry.due = row.due_count;
        }
    }

    let window_start = as_of - Duration::hours(24);
    let log_rows: Vec<LogCountsRow> = diesel::sql_query(
        "SELECT c.deck_id AS deck_id, \
                SUM(CASE WHEN l.state = 'new' THEN 1 ELSE 0 END) AS new_seen, \
                SUM(CASE WHEN l.state <> 'new' THEN 1 ELSE 0 END) AS review_seen \
         FROM review_logs l \
         INNER JOIN cards c ON c.card_id = l.card_id \
         WHERE l.user_id = ? AND l.reviewed_at >= ? \
         GROUP BY c.deck_id",
    )
    .bind::<Integer, _>(user_id)
    .bind::<Timestamp, _>(window_start)
    .load(conn)?;

    for row in log_rows {
        if let Some(entry) = stats.get_mut(&row.deck_id) {
            entry.new_seen_24h = row.new_seen;
            entry.review_seen_24h = row.review_seen;
        }
    }

    Ok(stats)
}
