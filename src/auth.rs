use axum::extract::{Json, State};
use axum::routing::{get, post};
use axum::Router;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tower_sessions::Session;
use validator::Validate;

use crate::deck::ApiResponse;
use crate::errors::AppError;
use crate::model::{NewUser, User};
use crate::schema::users;
use crate::utils::session::{current_user_id, set_user_session};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[axum::debug_handler]
async fn register(
    State((pool, _)): State<AppState>,
    session: Session,
    Json(form): Json<RegisterForm>,
) -> Result<Json<User>, AppError> {
    form.validate()?;

    let mut conn = pool.get()?;
    let existing = users::table
        .filter(users::email.eq(&form.email))
        .first::<User>(&mut conn)
        .optional()?;
    if existing.is_some() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let hashed = hash(&form.password, DEFAULT_COST)?;
    diesel::insert_into(users::table)
        .values(&NewUser {
            email: &form.email,
            password: &hashed,
            created_at: Utc::now().naive_utc(),
        })
        .execute(&mut conn)?;
    let user: User = users::table
        .filter(users::email.eq(&form.email))
        .first(&mut conn)?;

    set_user_session(&session, user.user_id, &user.email).await?;
    Ok(Json(user))
}

#[axum::debug_handler]
async fn login(
    State((pool, _)): State<AppState>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<Json<User>, AppError> {
    let mut conn = pool.get()?;
    let user = users::table
        .filter(users::email.eq(&form.email))
        .first::<User>(&mut conn)
        .optional()?;

    if let Some(user) = user {
        if verify(&form.password, &user.password)? {
            set_user_session(&session, user.user_id, &user.email).await?;
            return Ok(Json(user));
        }
    }

    Err(AppError::InvalidCredentials)
}

#[axum::debug_handler]
async fn logout(session: Session) -> Result<Json<ApiResponse>, AppError> {
    // Only established sessions can be logged out; others get a 401.
    current_user_id(&session).await?;
    session.flush().await.map_err(|e| {
        log::error!("failed to flush session: {e}");
        AppError::Session("Failed to log out".into())
    })?;
    Ok(Json(ApiResponse {
        success: true,
        message: "Logged out".to_string(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
}
