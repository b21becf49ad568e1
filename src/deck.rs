use axum::extract::{Json, Path, State};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::AppError;
use crate::model::{Card, Deck, NewDeck};
use crate::scheduler::{quota, stats};
use crate::schema::{cards, decks};
use crate::slug::slugify;
use crate::utils::session::current_user_id;
use crate::AppState;

#[derive(Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeckRequest {
    #[validate(length(min = 1, max = 100, message = "Deck name must be 1-100 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0.01, max = 100.0, message = "dailyScaler must be a positive number"))]
    #[serde(default = "default_scaler")]
    pub daily_scaler: f64,
}

fn default_scaler() -> f64 {
    1.0
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeckRequest {
    #[validate(length(min = 1, max = 100, message = "Deck name must be 1-100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0.01, max = 100.0, message = "dailyScaler must be a positive number"))]
    pub daily_scaler: Option<f64>,
}

/// A deck annotated with the counts the dashboard shows. `remaining_reviews`
/// caps card availability by the quota still open today.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckWithStats {
    #[serde(flatten)]
    pub deck: Deck,
    pub new_cards: i64,
    pub due_cards: i64,
    pub total_cards: i64,
    pub remaining_reviews: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckWithCards {
    #[serde(flatten)]
    pub deck: Deck,
    pub cards: Vec<Card>,
}

/// Finds one of the user's decks by slug or numeric id. Decks owned by other
/// users are indistinguishable from missing ones.
pub fn resolve_deck(
    conn: &mut SqliteConnection,
    user_id: i32,
    slug_or_id: &str,
) -> Result<Deck, AppError> {
    let mut query = decks::table
        .filter(decks::user_id.eq(user_id))
        .into_boxed();
    query = if let Ok(id) = slug_or_id.parse::<i32>() {
        query.filter(decks::deck_id.eq(id))
    } else {
        query.filter(decks::slug.eq(slug_or_id))
    };
    query.first(conn).optional()?.ok_or(AppError::NotFound)
}

#[axum::debug_handler]
pub async fn list_decks(
    State((pool, params_cache)): State<AppState>,
    session: tower_sessions::Session,
) -> Result<Json<Vec<DeckWithStats>>, AppError> {
    let user_id = current_user_id(&session).await?;
    let mut conn = pool.get()?;

    let own_decks: Vec<Deck> = decks::table
        .filter(decks::user_id.eq(user_id))
        .order(decks::name.asc())
        .load(&mut conn)?;
    let params = params_cache.get(&mut conn, user_id)?;

    let deck_ids: Vec<i32> = own_decks.iter().map(|d| d.deck_id).collect();
    let as_of = Utc::now().naive_utc();
    let counts = stats::batch_stats(&mut conn, user_id, &deck_ids, as_of)?;

    let annotated = own_decks
        .into_iter()
        .map(|deck| {
            let c = counts.get(&deck.deck_id).copied().unwrap_or_default();
            let remaining = quota::from_counts(&params, &deck, c.new_seen_24h, c.review_seen_24h);
            DeckWithStats {
                new_cards: c.new,
                due_cards: c.due,
                total_cards: c.total,
                remaining_reviews: c.due.min(remaining.review_remaining)
                    + c.new.min(remaining.new_remaining),
                deck,
            }
        })
        .collect();

    Ok(Json(annotated))
}

#[axum::debug_handler]
pub async fn create_deck(
    State((pool, _)): State<AppState>,
    session: tower_sessions::Session,
    Json(payload): Json<CreateDeckRequest>,
) -> Result<Json<Deck>, AppError> {
    let user_id = current_user_id(&session).await?;
    payload.validate()?;

    let slug = slugify(&payload.name);
    if slug.is_empty() {
        return Err(AppError::Validation(
            "Deck name must contain at least one letter or digit".into(),
        ));
    }

    let mut conn = pool.get()?;
    let taken: i64 = decks::table
        .filter(decks::user_id.eq(user_id))
        .filter(decks::name.eq(&payload.name).or(decks::slug.eq(&slug)))
        .count()
        .get_result(&mut conn)?;
    if taken > 0 {
        return Err(AppError::Conflict(
            "A deck with that name already exists".into(),
        ));
    }

    diesel::insert_into(decks::table)
        .values(&NewDeck {
            user_id,
            name: &payload.name,
            slug: &slug,
            description: &payload.description,
            daily_scaler: payload.daily_scaler,
            created_at: Utc::now().naive_utc(),
        })
        .execute(&mut conn)?;

    let deck: Deck = decks::table
        .filter(decks::user_id.eq(user_id))
        .filter(decks::slug.eq(&slug))
        .first(&mut conn)?;
    Ok(Json(deck))
}

#[axum::debug_handler]
pub async fn view_deck(
    Path(slug_or_id): Path<String>,
    State((pool, _)): State<AppState>,
    session: tower_sessions::Session,
) -> Result<Json<DeckWithCards>, AppError> {
    let user_id = current_user_id(&session).await?;
    let mut conn = pool.get()?;

    let deck = resolve_deck(&mut conn, user_id, &slug_or_id)?;
    let deck_cards: Vec<Card> = cards::table
        .filter(cards::deck_id.eq(deck.deck_id))
        .order(cards::card_id.asc())
        .load(&mut conn)?;

    Ok(Json(DeckWithCards {
        deck,
        cards: deck_cards,
    }))
}

#[axum::debug_handler]
pub async fn update_deck(
    Path(deck_id): Path<i32>,
    State((pool, _)): State<AppState>,
    session: tower_sessions::Session,
    Json(payload): Json<UpdateDeckRequest>,
) -> Result<Json<Deck>, AppError> {
    let user_id = current_user_id(&session).await?;
    payload.validate()?;

    let mut conn = pool.get()?;
    let deck: Deck = decks::table
        .filter(decks::deck_id.eq(deck_id))
        .filter(decks::user_id.eq(user_id))
        .first(&mut conn)
        .optional()?
        .ok_or(AppError::NotFound)?;

    let name = payload.name.unwrap_or(deck.name);
    let slug = slugify(&name);
    if slug.is_empty() {
        return Err(AppError::Validation(
            "Deck name must contain at least one letter or digit".into(),
        ));
    }
    let description = payload.description.unwrap_or(deck.description);
    let daily_scaler = payload.daily_scaler.unwrap_or(deck.daily_scaler);

    let taken: i64 = decks::table
        .filter(decks::user_id.eq(user_id))
        .filter(decks::deck_id.ne(deck_id))
        .filter(decks::name.eq(&name).or(decks::slug.eq(&slug)))
        .count()
        .get_result(&mut conn)?;
    if taken > 0 {
        return Err(AppError::Conflict(
            "A deck with that name already exists".into(),
        ));
    }

    diesel::update(decks::table.find(deck_id))
        .set((
            decks::name.eq(&name),
            decks::slug.eq(&slug),
            decks::description.eq(&description),
            decks::daily_scaler.eq(daily_scaler),
        ))
        .execute(&mut conn)?;

    let updated: Deck = decks::table.find(deck_id).first(&mut conn)?;
    Ok(Json(updated))
}

#[axum::debug_handler]
pub async fn delete_deck(
    Path(deck_id): Path<i32>,
    State((pool, _)): State<AppState>,
    session: tower_sessions::Session,
) -> Result<Json<ApiResponse>, AppError> {
    let user_id = current_user_id(&session).await?;
    let mut conn = pool.get()?;

    let owned: i64 = decks::table
        .filter(decks::deck_id.eq(deck_id))
        .filter(decks::user_id.eq(user_id))
        .count()
        .get_result(&mut conn)?;
    if owned == 0 {
        return Err(AppError::NotFound);
    }

    // Review logs stay: they are the append-only history. Orphaned rows fall
    // out of quota counts because counting joins logs to live cards.
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(cards::table.filter(cards::deck_id.eq(deck_id))).execute(conn)?;
        diesel::delete(decks::table.find(deck_id)).execute(conn)
    })?;

    Ok(Json(ApiResponse {
        success: true,
        message: "Deck deleted".to_string(),
    }))
}
