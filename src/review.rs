use axum::extract::{Json, Path, Query, State};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deck::resolve_deck;
use crate::errors::AppError;
use crate::model::{Card, Deck};
use crate::scheduler::fsrs::ReviewMetrics;
use crate::scheduler::pipeline::{self, ReviewOutcome};
use crate::scheduler::quota::DailyProgress;
use crate::scheduler::select::{self, Selection};
use crate::utils::session::current_user_id;
use crate::AppState;

const MAX_BATCH: i64 = 50;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewRequest {
    pub card_id: i32,
    pub rating: i32,
    pub reviewed_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DailyLimitBody {
    daily_limit_reached: bool,
    daily_progress: DailyProgress,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SubmitReviewResponse {
    Reviewed(Box<Card>),
    Limit(DailyLimitBody),
}

#[axum::debug_handler]
pub async fn submit_review(
    State((pool, params_cache)): State<AppState>,
    session: tower_sessions::Session,
    Json(payload): Json<SubmitReviewRequest>,
) -> Result<Json<SubmitReviewResponse>, AppError> {
    let user_id = current_user_id(&session).await?;
    let mut conn = pool.get()?;
    let params = params_cache.get(&mut conn, user_id)?;

    let outcome = pipeline::submit_review(
        &mut conn,
        &params,
        user_id,
        payload.card_id,
        payload.rating,
        payload.reviewed_at,
    )?;

    let response = match outcome {
        ReviewOutcome::Reviewed { card } => SubmitReviewResponse::Reviewed(Box::new(card)),
        ReviewOutcome::DailyLimitReached { progress } => {
            SubmitReviewResponse::Limit(DailyLimitBody {
                daily_limit_reached: true,
                daily_progress: progress,
            })
        }
    };
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct CandidateQuery {
    pub count: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CandidateEntry {
    #[serde(flatten)]
    card: Card,
    review_metrics: ReviewMetrics,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SingleCandidateBody {
    deck: Deck,
    card: Card,
    review_metrics: ReviewMetrics,
    daily_progress: DailyProgress,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManyCandidatesBody {
    deck: Deck,
    cards: Vec<CandidateEntry>,
    daily_progress: DailyProgress,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AllCaughtUpBody {
    all_caught_up: bool,
    deck: Deck,
    daily_progress: DailyProgress,
    total_cards: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmptyDeckBody {
    empty_deck: bool,
    deck: Deck,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum CandidatesResponse {
    Single(Box<SingleCandidateBody>),
    Many(ManyCandidatesBody),
    AllCaughtUp(AllCaughtUpBody),
    EmptyDeck(EmptyDeckBody),
}

#[axum::debug_handler]
pub async fn review_candidates(
    Path(slug_or_id): Path<String>,
    Query(query): Query<CandidateQuery>,
    State((pool, params_cache)): State<AppState>,
    session: tower_sessions::Session,
) -> Result<Json<CandidatesResponse>, AppError> {
    let user_id = current_user_id(&session).await?;
    let count = query.count.unwrap_or(1).clamp(1, MAX_BATCH);
    let mut conn = pool.get()?;

    let deck = resolve_deck(&mut conn, user_id, &slug_or_id)?;
    let params = params_cache.get(&mut conn, user_id)?;
    let as_of = Utc::now().naive_utc();

    let response = match select::select(&mut conn, &params, &deck, count, as_of)? {
        Selection::EmptyDeck => CandidatesResponse::EmptyDeck(EmptyDeckBody {
            empty_deck: true,
            deck,
        }),
        Selection::AllCaughtUp {
            progress,
            total_cards,
        } => CandidatesResponse::AllCaughtUp(AllCaughtUpBody {
            all_caught_up: true,
            deck,
            daily_progress: progress,
            total_cards,
        }),
        Selection::Cards {
            mut candidates,
            progress,
        } if count == 1 => {
            let picked = candidates.remove(0);
            CandidatesResponse::Single(Box::new(SingleCandidateBody {
                deck,
                card: picked.card,
                review_metrics: picked.metrics,
                daily_progress: progress,
            }))
        }
        Selection::Cards {
            candidates,
            progress,
        } => CandidatesResponse::Many(ManyCandidatesBody {
            deck,
            cards: candidates
                .into_iter()
                .map(|c| CandidateEntry {
                    card: c.card,
                    review_metrics: c.metrics,
                })
                .collect(),
            daily_progress: progress,
        }),
    };
    Ok(Json(response))
}
