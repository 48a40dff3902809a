use crate::db::DbResult;
use crate::models::activity::{ActivityFilter, ActivityLog, ActivityStats, UserActivity};
use crate::models::item::Pagination;
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait ActivityRepo: Send + Sync {
    async fn insert(&self, log: &ActivityLog) -> DbResult<()>;
    /// Newest first, plus the total number of matches
    async fn list(&self, filter: &ActivityFilter, page: Pagination) -> DbResult<(Vec<ActivityLog>, u64)>;
    /// `recent_since` bounds the `recent_activity` counter
    async fn stats(&self, recent_since: DateTime<Utc>) -> DbResult<ActivityStats>;
    /// Distinct users, most recently active first
    async fn users(&self) -> DbResult<Vec<UserActivity>>;
}
