//! Per-user algorithm parameters and their process-wide cache.
//!
//! Settings rows are created lazily with defaults on first touch. The cache
//! is keyed by user id with a bounded lifetime; the settings-update handler
//! invalidates it synchronously, so a stale entry never outlives a settings
//! write by more than the TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::errors::AppError;
use crate::model::UserSettingsRow;
use crate::schema::user_settings;

pub const DEFAULT_WEIGHTS: [f64; 19] = [
    0.40255, 1.18385, 3.173, 15.69105, 7.1949, 0.5345, 1.4604, 0.0046, 1.54575, 0.1192, 1.01925,
    1.9395, 0.11, 0.29605, 2.2698, 0.2315, 2.9898, 0.51655, 0.6621,
];

pub const DEFAULT_REQUEST_RETENTION: f64 = 0.9;
pub const DEFAULT_MAXIMUM_INTERVAL: i32 = 36_500;
pub const DEFAULT_NEW_CARDS_PER_DAY: i32 = 20;
pub const DEFAULT_MAX_REVIEWS_PER_DAY: i32 = 200;

const CACHE_TTL: Duration = Duration::from_secs(300);

/// Inputs to the memory-model updater.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerParams {
    pub request_retention: f64,
    pub maximum_interval: i32,
    pub weights: [f64; 19],
    pub enable_fuzz: bool,
    pub enable_short_term: bool,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        SchedulerParams {
            request_retention: DEFAULT_REQUEST_RETENTION,
            maximum_interval: DEFAULT_MAXIMUM_INTERVAL,
            weights: DEFAULT_WEIGHTS,
            enable_fuzz: false,
            enable_short_term: true,
        }
    }
}

/// Everything the scheduler needs to know about one user: daily limits plus
/// the memory-model parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct UserParams {
    pub new_cards_per_day: i32,
    pub max_reviews_per_day: i32,
    pub scheduler: SchedulerParams,
}

impl UserParams {
    fn from_row(row: &UserSettingsRow) -> Self {
        let weights = parse_weights(&row.weights).unwrap_or_else(|| {
            log::warn!(
                "user {} has an unreadable weight vector, falling back to defaults",
                row.user_id
            );
            DEFAULT_WEIGHTS
        });
        UserParams {
            new_cards_per_day: row.new_cards_per_day,
            max_reviews_per_day: row.max_reviews_per_day,
            scheduler: SchedulerParams {
                request_retention: row.request_retention,
                maximum_interval: row.maximum_interval,
                weights,
                enable_fuzz: row.enable_fuzz,
                enable_short_term: row.enable_short_term,
            },
        }
    }
}

fn parse_weights(raw: &str) -> Option<[f64; 19]> {
    let parsed: Vec<f64> = serde_json::from_str(raw).ok()?;
    parsed.try_into().ok()
}

pub fn default_settings_row(user_id: i32, now: NaiveDateTime) -> UserSettingsRow {
    UserSettingsRow {
        user_id,
        new_cards_per_day: DEFAULT_NEW_CARDS_PER_DAY,
        max_reviews_per_day: DEFAULT_MAX_REVIEWS_PER_DAY,
        request_retention: DEFAULT_REQUEST_RETENTION,
        maximum_interval: DEFAULT_MAXIMUM_INTERVAL,
        weights: serde_json::to_string(&DEFAULT_WEIGHTS.to_vec())
            .expect("weights always serialize"),
        enable_fuzz: false,
        enable_short_term: true,
        updated_at: now,
    }
}

/// Loads a user's settings row, inserting defaults on first touch.
pub fn load_settings(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<UserSettingsRow, AppError> {
    if let Some(row) = user_settings::table
        .find(user_id)
        .first::<UserSettingsRow>(conn)
        .optional()?
    {
        return Ok(row);
    }

    let defaults = default_settings_row(user_id, Utc::now().naive_utc());
    diesel::insert_into(user_settings::table)
        .values(&defaults)
        .on_conflict(user_settings::user_id)
        .do_nothing()
        .execute(conn)?;
    Ok(user_settings::table
        .find(user_id)
        .first::<UserSettingsRow>(conn)?)
}

struct CacheEntry {
    params: Arc<UserParams>,
    loaded_at: Instant,
}

/// Process-wide cache of [`UserParams`], keyed by user id.
#[derive(Clone)]
pub struct ParamsCache {
    ttl: Duration,
    inner: Arc<Mutex<HashMap<i32, CacheEntry>>>,
}

impl Default for ParamsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamsCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        ParamsCache {
            ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn get(
        &self,
        conn: &mut SqliteConnection,
        user_id: i32,
    ) -> Result<Arc<UserParams>, AppError> {
        {
            let cache = self.inner.lock().expect("params cache poisoned");
            if let Some(entry) = cache.get(&user_id) {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Ok(entry.params.clone());
                }
            }
        }

        let row = load_settings(conn, user_id)?;
        let params = Arc::new(UserParams::from_row(&row));
        let mut cache = self.inner.lock().expect("params cache poisoned");
        cache.insert(
            user_id,
            CacheEntry {
                params: params.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(params)
    }

    /// Drops the cached entry for a user. Called synchronously by the
    /// settings-update path.
    pub fn invalidate(&self, user_id: i32) {
        self.inner
            .lock()
            .expect("params cache poisoned")
            .remove(&user_id);
    }
}
