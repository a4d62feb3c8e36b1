//! In-memory caches
//!
//! These caches are volatile and cleared on restart.
//! Uses Moka for high-performance concurrent caching.

use moka::future::Cache;
use sqlx::SqliteConnection;
use std::sync::Arc;
use std::time::Duration;

use super::Database;
use super::models::{EntityId, UserSummary};
use crate::error::AppError;

// =============================================================================
// Profile Cache
// =============================================================================

/// Display fields of users, keyed by user id
///
/// Realtime events and notifications embed the sender's summary so clients
/// can render without a follow-up fetch; this keeps those lookups off the
/// database on hot paths.
pub struct ProfileCache {
    profiles: Cache<EntityId, Arc<UserSummary>>,
}

impl ProfileCache {
    /// Create new profile cache
    ///
    /// # Arguments
    /// * `ttl_secs` - Time to live for each entry
    /// * `max_entries` - Capacity before eviction
    pub fn new(ttl_secs: u64, max_entries: u64) -> Self {
        let profiles = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { profiles }
    }

    /// Get a summary, loading it from the database on a miss
    ///
    /// Returns `None` if the user does not exist. A connection is only taken
    /// from the pool on a miss; callers already holding one should use
    /// [`get_or_load_on`](Self::get_or_load_on) instead.
    pub async fn get_or_load(
        &self,
        db: &Database,
        user_id: &EntityId,
    ) -> Result<Option<Arc<UserSummary>>, AppError> {
        if let Some(summary) = self.lookup(user_id).await {
            return Ok(Some(summary));
        }
        let mut conn = db.acquire().await?;
        self.load(&mut conn, user_id).await
    }

    /// Like [`get_or_load`](Self::get_or_load) but reuses the caller's
    /// connection on a miss
    pub async fn get_or_load_on(
        &self,
        conn: &mut SqliteConnection,
        user_id: &EntityId,
    ) -> Result<Option<Arc<UserSummary>>, AppError> {
        if let Some(summary) = self.lookup(user_id).await {
            return Ok(Some(summary));
        }
        self.load(conn, user_id).await
    }

    /// Like [`get_or_load`](Self::get_or_load) but `NotFound` when absent
    pub async fn require(
        &self,
        db: &Database,
        user_id: &EntityId,
    ) -> Result<Arc<UserSummary>, AppError> {
        self.get_or_load(db, user_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn require_on(
        &self,
        conn: &mut SqliteConnection,
        user_id: &EntityId,
    ) -> Result<Arc<UserSummary>, AppError> {
        self.get_or_load_on(conn, user_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn lookup(&self, user_id: &EntityId) -> Option<Arc<UserSummary>> {
        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};

        let cached = self.profiles.get(user_id).await;
        if cached.is_some() {
            CACHE_HITS_TOTAL.with_label_values(&["profile"]).inc();
        } else {
            CACHE_MISSES_TOTAL.with_label_values(&["profile"]).inc();
        }
        cached
    }

    async fn load(
        &self,
        conn: &mut SqliteConnection,
        user_id: &EntityId,
    ) -> Result<Option<Arc<UserSummary>>, AppError> {
        let Some(summary) = super::users::find_summary(conn, user_id).await? else {
            return Ok(None);
        };

        let summary = Arc::new(summary);
        self.insert(summary.clone()).await;
        Ok(Some(summary))
    }

    pub async fn insert(&self, summary: Arc<UserSummary>) {
        self.profiles.insert(summary.id.clone(), summary).await;

        use crate::metrics::CACHE_SIZE;
        CACHE_SIZE
            .with_label_values(&["profile"])
            .set(self.profiles.entry_count() as i64);
    }

    /// Drop a cached summary after the user edits their profile
    pub async fn invalidate(&self, user_id: &EntityId) {
        self.profiles.invalidate(user_id).await;
    }
}
