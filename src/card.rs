use axum::extract::{Json, Path, State};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use validator::Validate;

use crate::deck::ApiResponse;
use crate::errors::AppError;
use crate::model::{Card, CardState, NewCard};
use crate::schema::{cards, decks};
use crate::utils::session::current_user_id;
use crate::AppState;

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardRequest {
    pub deck_id: i32,
    #[validate(length(min = 1, max = 10000, message = "Card front must not be empty"))]
    pub front: String,
    #[validate(length(min = 1, max = 10000, message = "Card back must not be empty"))]
    pub back: String,
}

/// Content-only edit. Scheduling fields are never writable directly; they
/// change exclusively through review submissions.
#[derive(Deserialize, Validate)]
pub struct UpdateCardRequest {
    #[validate(length(min = 1, max = 10000, message = "Card front must not be empty"))]
    pub front: Option<String>,
    #[validate(length(min = 1, max = 10000, message = "Card back must not be empty"))]
    pub back: Option<String>,
}

fn load_owned_card(
    conn: &mut SqliteConnection,
    user_id: i32,
    card_id: i32,
) -> Result<Card, AppError> {
    let card: Card = cards::table
        .find(card_id)
        .first(conn)
        .optional()?
        .ok_or(AppError::NotFound)?;
    if card.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(card)
}

#[axum::debug_handler]
pub async fn create_card(
    State((pool, _)): State<AppState>,
    session: tower_sessions::Session,
    Json(payload): Json<CreateCardRequest>,
) -> Result<Json<Card>, AppError> {
    let user_id = current_user_id(&session).await?;
    payload.validate()?;

    let mut conn = pool.get()?;
    let deck_owned: i64 = decks::table
        .filter(decks::deck_id.eq(payload.deck_id))
        .filter(decks::user_id.eq(user_id))
        .count()
        .get_result(&mut conn)?;
    if deck_owned == 0 {
        return Err(AppError::NotFound);
    }

    diesel::insert_into(cards::table)
        .values(&NewCard {
            user_id,
            deck_id: payload.deck_id,
            front: &payload.front,
            back: &payload.back,
            state: CardState::New,
            due: None,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            last_review: None,
            created_at: Utc::now().naive_utc(),
        })
        .execute(&mut conn)?;

    let card: Card = cards::table
        .order(cards::card_id.desc())
        .filter(cards::user_id.eq(user_id))
        .first(&mut conn)?;
    Ok(Json(card))
}

#[axum::debug_handler]
pub async fn update_card(
    Path(card_id): Path<i32>,
    State((pool, _)): State<AppState>,
    session: tower_sessions::Session,
    Json(payload): Json<UpdateCardRequest>,
) -> Result<Json<Card>, AppError> {
    let user_id = current_user_id(&session).await?;
    payload.validate()?;

    let mut conn = pool.get()?;
    let card = load_owned_card(&mut conn, user_id, card_id)?;

    let front = payload.front.unwrap_or(card.front);
    let back = payload.back.unwrap_or(card.back);
    diesel::update(cards::table.find(card_id))
        .set((cards::front.eq(&front), cards::back.eq(&back)))
        .execute(&mut conn)?;

    let updated: Card = cards::table.find(card_id).first(&mut conn)?;
    Ok(Json(updated))
}

#[axum::debug_handler]
pub async fn delete_card(
    Path(card_id): Path<i32>,
    State((pool, _)): State<AppState>,
    session: tower_sessions::Session,
) -> Result<Json<ApiResponse>, AppError> {
    let user_id = current_user_id(&session).await?;
    let mut conn = pool.get()?;

    load_owned_card(&mut conn, user_id, card_id)?;
    diesel::delete(cards::table.find(card_id)).execute(&mut conn)?;

    Ok(Json(ApiResponse {
        success: true,
        message: "Card deleted".to_string(),
    }))
}
