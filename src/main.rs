use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use time::Duration;
use tokio::net::TcpListener;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

mod auth;
mod card;
mod deck;
mod errors;
mod model;
mod review;
mod scheduler;
mod schema;
mod settings;
mod slug;
#[cfg(test)]
mod test_support;
mod utils;

use scheduler::params::ParamsCache;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type AppState = (DbPool, ParamsCache);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://cardbox.db".into());
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .build(manager)
        .context("failed to create DB pool")?;

    let state: AppState = (pool, ParamsCache::new());

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::days(1)))
        .with_secure(false);

    let deck_router = Router::new()
        .route("/", get(deck::list_decks).post(deck::create_deck))
        .route(
            "/{slug_or_id}",
            get(deck::view_deck)
                .patch(deck::update_deck)
                .delete(deck::delete_deck),
        )
        .route("/{slug_or_id}/review", get(review::review_candidates));

    let card_router = Router::new()
        .route("/", post(card::create_card))
        .route(
            "/{card_id}",
            axum::routing::patch(card::update_card).delete(card::delete_card),
        );

    let api_router = Router::new()
        .nest("/decks", deck_router)
        .nest("/cards", card_router)
        .route("/reviews", post(review::submit_review))
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        );

    let app = Router::new()
        .nest("/auth", auth::router())
        .nest("/api", api_router)
        .layer(session_layer)
        .with_state(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".into());
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    log::info!("listening on http://{bind_addr}");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
