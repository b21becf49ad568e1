use tower_sessions::Session;

use crate::errors::AppError;

pub async fn set_user_session(session: &Session, user_id: i32, email: &str) -> Result<(), AppError> {
    session.insert("user_id", user_id).await?;
    session.insert("user_email", email).await?;
    Ok(())
}

/// Resolves the logged-in user, or fails the request with 401.
pub async fn current_user_id(session: &Session) -> Result<i32, AppError> {
    match session.get::<i32>("user_id").await {
        Ok(Some(user_id)) => Ok(user_id),
        Ok(None) => Err(AppError::Unauthorized),
        Err(e) => {
            log::error!("failed to read user_id from session: {e}");
            Err(AppError::Unauthorized)
        }
    }
}
