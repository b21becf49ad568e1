//! Shared helpers for DB-backed tests: an in-memory SQLite connection with
//! the schema applied, plus seed functions for users, decks, cards and logs.

use chrono::{NaiveDate, NaiveDateTime};
use diesel::connection::SimpleConnection;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Integer;

use crate::model::{Card, CardState, Deck, NewCard, NewDeck, NewReviewLog, NewUser};
use crate::schema::{cards, decks, review_logs, users};

const SCHEMA: &str = "
CREATE TABLE users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL
);
CREATE TABLE decks (
    deck_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (user_id),
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    daily_scaler REAL NOT NULL DEFAULT 1.0,
    created_at TIMESTAMP NOT NULL,
    UNIQUE (user_id, name),
    UNIQUE (user_id, slug)
);
CREATE TABLE cards (
    card_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (user_id),
    deck_id INTEGER NOT NULL REFERENCES decks (deck_id),
    front TEXT NOT NULL,
    back TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'new',
    due TIMESTAMP,
    stability DOUBLE NOT NULL DEFAULT 0,
    difficulty DOUBLE NOT NULL DEFAULT 0,
    elapsed_days INTEGER NOT NULL DEFAULT 0,
    scheduled_days INTEGER NOT NULL DEFAULT 0,
    reps INTEGER NOT NULL DEFAULT 0,
    lapses INTEGER NOT NULL DEFAULT 0,
    last_review TIMESTAMP,
    created_at TIMESTAMP NOT NULL
);
CREATE TABLE review_logs (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    card_id INTEGER NOT NULL REFERENCES cards (card_id),
    user_id INTEGER NOT NULL REFERENCES users (user_id),
    rating INTEGER NOT NULL,
    state TEXT NOT NULL,
    due TIMESTAMP,
    stability DOUBLE NOT NULL,
    difficulty DOUBLE NOT NULL,
    elapsed_days INTEGER NOT NULL,
    last_elapsed_days INTEGER NOT NULL,
    scheduled_days INTEGER NOT NULL,
    reviewed_at TIMESTAMP NOT NULL
);
CREATE TABLE user_settings (
    user_id INTEGER PRIMARY KEY REFERENCES users (user_id),
    new_cards_per_day INTEGER NOT NULL,
    max_reviews_per_day INTEGER NOT NULL,
    request_retention DOUBLE NOT NULL,
    maximum_interval INTEGER NOT NULL,
    weights TEXT NOT NULL,
    enable_fuzz BOOLEAN NOT NULL,
    enable_short_term BOOLEAN NOT NULL,
    updated_at TIMESTAMP NOT NULL
);
";

pub fn test_conn() -> SqliteConnection {
    let mut conn =
        SqliteConnection::establish(":memory:").expect("in-memory sqlite always opens");
    conn.batch_execute(SCHEMA).expect("schema applies");
    conn
}

pub fn ts(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn last_rowid(conn: &mut SqliteConnection) -> i32 {
    diesel::select(sql::<Integer>("last_insert_rowid()"))
        .get_result(conn)
        .unwrap()
}

pub fn seed_user(conn: &mut SqliteConnection, email: &str) -> i32 {
    diesel::insert_into(users::table)
        .values(&NewUser {
            email,
            password: "hash",
            created_at: ts(2024, 1, 1, 0, 0),
        })
        .execute(conn)
        .unwrap();
    last_rowid(conn)
}

pub fn seed_deck(conn: &mut SqliteConnection, user_id: i32, name: &str, daily_scaler: f64) -> Deck {
    let slug = name.to_lowercase().replace(' ', "-");
    diesel::insert_into(decks::table)
        .values(&NewDeck {
            user_id,
            name,
            slug: &slug,
            description: "",
            daily_scaler,
            created_at: ts(2024, 1, 1, 0, 0),
        })
        .execute(conn)
        .unwrap();
    let deck_id = last_rowid(conn);
    decks::table.find(deck_id).first(conn).unwrap()
}

/// Seeds a card in the given state. New cards have no due date; any other
/// state gets a generic mid-life scheduling snapshot.
pub fn seed_card(conn: &mut SqliteConnection, user_id: i32, deck_id: i32, state: CardState) -> i32 {
    let (due, stability, reps, last_review) = match state {
        CardState::New => (None, 0.0, 0, None),
        _ => (
            Some(ts(2024, 3, 5, 0, 0)),
            4.0,
            2,
            Some(ts(2024, 3, 1, 0, 0)),
        ),
    };
    insert_card(conn, user_id, deck_id, state, due, stability, reps, last_review)
}

/// Seeds a review-state card due at the given instant.
pub fn seed_card_due(
    conn: &mut SqliteConnection,
    user_id: i32,
    deck_id: i32,
    due: NaiveDateTime,
) -> i32 {
    insert_card(
        conn,
        user_id,
        deck_id,
        CardState::Review,
        Some(due),
        4.0,
        2,
        Some(due - chrono::Duration::days(4)),
    )
}

#[allow(clippy::too_many_arguments)]
fn insert_card(
    conn: &mut SqliteConnection,
    user_id: i32,
    deck_id: i32,
    state: CardState,
    due: Option<NaiveDateTime>,
    stability: f64,
    reps: i32,
    last_review: Option<NaiveDateTime>,
) -> i32 {
    diesel::insert_into(cards::table)
        .values(&NewCard {
            user_id,
            deck_id,
            front: "front",
            back: "back",
            state,
            due,
            stability,
            difficulty: if state == CardState::New { 0.0 } else { 5.0 },
            elapsed_days: 0,
            scheduled_days: if state == CardState::New { 0 } else { 4 },
            reps,
            lapses: 0,
            last_review,
            created_at: ts(2024, 1, 1, 0, 0),
        })
        .execute(conn)
        .unwrap();
    last_rowid(conn)
}

/// Appends a review-log row with the given snapshot state and timestamp.
pub fn seed_log(
    conn: &mut SqliteConnection,
    card_id: i32,
    user_id: i32,
    state: CardState,
    reviewed_at: NaiveDateTime,
) {
    diesel::insert_into(review_logs::table)
        .values(&NewReviewLog {
            card_id,
            user_id,
            rating: 3,
            state,
            due: None,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            last_elapsed_days: 0,
            scheduled_days: 0,
            reviewed_at,
        })
        .execute(conn)
        .unwrap();
}

pub fn get_card(conn: &mut SqliteConnection, card_id: i32) -> Card {
    cards::table.find(card_id).first(conn).unwrap()
}
