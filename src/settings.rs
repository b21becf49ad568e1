use axum::extract::{Json, State};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::AppError;
use crate::model::UserSettingsRow;
use crate::scheduler::params::{self, ParamsCache};
use crate::schema::user_settings;
use crate::utils::session::current_user_id;
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBody {
    pub new_cards_per_day: i32,
    pub max_reviews_per_day: i32,
    pub request_retention: f64,
    pub maximum_interval: i32,
    pub weights: Vec<f64>,
    pub enable_fuzz: bool,
    pub enable_short_term: bool,
}

impl SettingsBody {
    fn from_row(row: UserSettingsRow) -> Self {
        let weights = serde_json::from_str(&row.weights)
            .unwrap_or_else(|_| params::DEFAULT_WEIGHTS.to_vec());
        SettingsBody {
            new_cards_per_day: row.new_cards_per_day,
            max_reviews_per_day: row.max_reviews_per_day,
            request_retention: row.request_retention,
            maximum_interval: row.maximum_interval,
            weights,
            enable_fuzz: row.enable_fuzz,
            enable_short_term: row.enable_short_term,
        }
    }
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    #[validate(range(min = 0, max = 1000, message = "newCardsPerDay out of range"))]
    pub new_cards_per_day: Option<i32>,
    #[validate(range(min = 0, max = 10000, message = "maxReviewsPerDay out of range"))]
    pub max_reviews_per_day: Option<i32>,
    #[validate(range(
        min = 0.5,
        max = 0.995,
        message = "requestRetention must be between 0.5 and 0.995"
    ))]
    pub request_retention: Option<f64>,
    #[validate(range(min = 1, max = 36500, message = "maximumInterval out of range"))]
    pub maximum_interval: Option<i32>,
    pub weights: Option<Vec<f64>>,
    pub enable_fuzz: Option<bool>,
    pub enable_short_term: Option<bool>,
}

/// Merges the payload into the stored row, writes it, and invalidates the
/// params cache before returning so no later read can see the old values.
pub fn apply_settings(
    conn: &mut SqliteConnection,
    cache: &ParamsCache,
    user_id: i32,
    payload: UpdateSettingsRequest,
) -> Result<UserSettingsRow, AppError> {
    payload.validate()?;
    if let Some(weights) = &payload.weights {
        if weights.len() != 19 {
            return Err(AppError::Validation(
                "weights must contain exactly 19 values".into(),
            ));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(AppError::Validation("weights must be finite".into()));
        }
    }

    let current = params::load_settings(conn, user_id)?;
    let weights = match payload.weights {
        Some(w) => serde_json::to_string(&w).expect("weights always serialize"),
        None => current.weights,
    };
    let row = UserSettingsRow {
        user_id,
        new_cards_per_day: payload.new_cards_per_day.unwrap_or(current.new_cards_per_day),
        max_reviews_per_day: payload
            .max_reviews_per_day
            .unwrap_or(current.max_reviews_per_day),
        request_retention: payload.request_retention.unwrap_or(current.request_retention),
        maximum_interval: payload.maximum_interval.unwrap_or(current.maximum_interval),
        weights,
        enable_fuzz: payload.enable_fuzz.unwrap_or(current.enable_fuzz),
        enable_short_term: payload.enable_short_term.unwrap_or(current.enable_short_term),
        updated_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(user_settings::table)
        .values(&row)
        .on_conflict(user_settings::user_id)
        .do_update()
        .set((
            user_settings::new_cards_per_day.eq(row.new_cards_per_day),
            user_settings::max_reviews_per_day.eq(row.max_reviews_per_day),
            user_settings::request_retention.eq(row.request_retention),
            user_settings::maximum_interval.eq(row.maximum_interval),
            user_settings::weights.eq(&row.weights),
            user_settings::enable_fuzz.eq(row.enable_fuzz),
            user_settings::enable_short_term.eq(row.enable_short_term),
            user_settings::updated_at.eq(row.updated_at),
        ))
        .execute(conn)?;

    cache.invalidate(user_id);
    Ok(user_settings::table.find(user_id).first(conn)?)
}

#[axum::debug_handler]
pub async fn get_settings(
    State((pool, _)): State<AppState>,
    session: tower_sessions::Session,
) -> Result<Json<SettingsBody>, AppError> {
    let user_id = current_user_id(&session).await?;
    let mut conn = pool.get()?;
    let row = params::load_settings(&mut conn, user_id)?;
    Ok(Json(SettingsBody::from_row(row)))
}

#[axum::debug_handler]
pub async fn update_settings(
    State((pool, params_cache)): State<AppState>,
    session: tower_sessions::Session,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsBody>, AppError> {
    let user_id = current_user_id(&session).await?;
    let mut conn = pool.get()?;
    let row = apply_settings(&mut conn, &params_cache, user_id, payload)?;
    Ok(Json(SettingsBody::from_row(row)))
}
