use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteValue};
use serde::{Deserialize, Serialize};

use crate::schema::{cards, decks, review_logs, user_settings, users};

/// Lifecycle stage of a card's scheduling. Stored as lowercase text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardState::New => "new",
            CardState::Learning => "learning",
            CardState::Review => "review",
            CardState::Relearning => "relearning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(CardState::New),
            "learning" => Some(CardState::Learning),
            "review" => Some(CardState::Review),
            "relearning" => Some(CardState::Relearning),
            _ => None,
        }
    }
}

impl ToSql<Text, Sqlite> for CardState {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for CardState {
    fn from_sql(value: SqliteValue<'_, '_, '_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(value)?;
        CardState::parse(&s).ok_or_else(|| format!("unknown card state: {s}").into())
    }
}

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = users, primary_key(user_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub user_id: i32,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = decks, primary_key(deck_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub deck_id: i32,
    pub user_id: i32,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub daily_scaler: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = decks)]
pub struct NewDeck<'a> {
    pub user_id: i32,
    pub name: &'a str,
    pub slug: &'a str,
    pub description: &'a str,
    pub daily_scaler: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = cards, primary_key(card_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub card_id: i32,
    pub user_id: i32,
    pub deck_id: i32,
    pub front: String,
    pub back: String,
    pub state: CardState,
    pub due: Option<NaiveDateTime>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub reps: i32,
    pub lapses: i32,
    pub last_review: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = cards)]
pub struct NewCard<'a> {
    pub user_id: i32,
    pub deck_id: i32,
    pub front: &'a str,
    pub back: &'a str,
    pub state: CardState,
    pub due: Option<NaiveDateTime>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub reps: i32,
    pub lapses: i32,
    pub last_review: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = review_logs, primary_key(log_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct ReviewLog {
    pub log_id: i32,
    pub card_id: i32,
    pub user_id: i32,
    pub rating: i32,
    pub state: CardState,
    pub due: Option<NaiveDateTime>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub last_elapsed_days: i32,
    pub scheduled_days: i32,
    pub reviewed_at: NaiveDateTime,
}

/// Snapshot of a card as it stood immediately before the update that
/// produced this row. Append-only.
#[derive(Insertable)]
#[diesel(table_name = review_logs)]
pub struct NewReviewLog {
    pub card_id: i32,
    pub user_id: i32,
    pub rating: i32,
    pub state: CardState,
    pub due: Option<NaiveDateTime>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub last_elapsed_days: i32,
    pub scheduled_days: i32,
    pub reviewed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = user_settings, primary_key(user_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserSettingsRow {
    pub user_id: i32,
    pub new_cards_per_day: i32,
    pub max_reviews_per_day: i32,
    pub request_retention: f64,
    pub maximum_interval: i32,
    pub weights: String,
    pub enable_fuzz: bool,
    pub enable_short_term: bool,
    pub updated_at: NaiveDateTime,
}
