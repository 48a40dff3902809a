use crate::db::repo::ActivityRepo;
use crate::error::AppResult;
use crate::models::activity::{ActivityAction, ActivityFilter, ActivityLog, ActivityStats, UserActivity};
use crate::models::chest::{Chest, QuantityChange};
use crate::models::item::{Item, Pagination};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Who performed an audited operation.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub id: &'a str,
    pub username: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPagination {
    pub page: i64,
    pub limit: i64,
    pub total: u64,
    pub pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl LogPagination {
    pub fn new(page: Pagination, total: u64) -> Self {
        let limit = page.limit.max(1) as u64;
        Self {
            page: page.page,
            limit: page.limit,
            total,
            pages: total.div_ceil(limit),
            has_next: (page.page as u64).saturating_mul(limit) < total,
            has_prev: page.page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub logs: Vec<ActivityLog>,
    pub pagination: LogPagination,
}

/// Append-only audit trail. Writes are best-effort: a failing store never fails the caller.
pub struct ActivityService {
    repo: Arc<dyn ActivityRepo>,
}

impl ActivityService {
    pub fn new(repo: Arc<dyn ActivityRepo>) -> Self {
        Self { repo }
    }

    pub async fn record(&self, log: ActivityLog) {
        match self.repo.insert(&log).await {
            Ok(()) => tracing::debug!(action = %log.action, user = %log.username, "activity logged"),
            Err(e) => tracing::warn!(error = %e, action = %log.action, user = %log.username, "cannot write activity log"),
        }
    }

    /// Stores an entry submitted by a client. Unlike the typed records, a failing store is an error here.
    pub async fn append(&self, log: ActivityLog) -> AppResult<ActivityLog> {
        self.repo.insert(&log).await?;
        tracing::debug!(action = %log.action, user = %log.username, "activity appended");
        Ok(log)
    }

    pub async fn users(&self) -> AppResult<Vec<UserActivity>> {
        Ok(self.repo.users().await?)
    }

    pub async fn list(&self, filter: &ActivityFilter, page: Pagination) -> AppResult<LogPage> {
        let (logs, total) = self.repo.list(filter, page).await?;
        Ok(LogPage {
            logs,
            pagination: LogPagination::new(page, total),
        })
    }

    pub async fn stats(&self) -> AppResult<ActivityStats> {
        let since = Utc::now() - Duration::hours(24);
        Ok(self.repo.stats(since).await?)
    }

    // ========================================================================
    // TYPED RECORDS
    // ========================================================================

    pub async fn chest_created(&self, actor: Actor<'_>, chest: &Chest) {
        let log = ActivityLog::new(actor.id, actor.username, ActivityAction::CreateChest)
            .chest(chest.id, &chest.name)
            .details(format!("Created chest \"{}\"", chest.name));
        self.record(log).await;
    }

    pub async fn chest_renamed(&self, actor: Actor<'_>, chest: &Chest, old_name: &str) {
        let log = ActivityLog::new(actor.id, actor.username, ActivityAction::RenameChest)
            .chest(chest.id, &chest.name)
            .details(format!("Renamed chest \"{old_name}\" to \"{}\"", chest.name));
        self.record(log).await;
    }

    pub async fn chest_deleted(&self, actor: Actor<'_>, chest: &Chest, details: String) {
        let log = ActivityLog::new(actor.id, actor.username, ActivityAction::DeleteChest)
            .chest(chest.id, &chest.name)
            .details(details);
        self.record(log).await;
    }

    pub async fn item_moved(&self, actor: Actor<'_>, chest: &Chest, item: &Item, change: QuantityChange) {
        let added = change.new > change.old;
        let action = if added {
            ActivityAction::AddItem
        } else {
            ActivityAction::RemoveItem
        };
        let amount = (change.new - change.old).abs();
        let details = if added {
            format!("Added {amount} {} to {}", item.name, chest.name)
        } else {
            format!("Removed {amount} {} from {}", item.name, chest.name)
        };

        let log = ActivityLog::new(actor.id, actor.username, action)
            .chest(chest.id, &chest.name)
            .item(item.canonical_ref(), &item.name)
            .quantities(change.old, change.new)
            .details(details);
        self.record(log).await;
    }

    pub async fn stock_updated(&self, actor: Actor<'_>, item: &Item, old: i64) {
        let log = ActivityLog::new(actor.id, actor.username, ActivityAction::UpdateItemQuantity)
            .item(item.canonical_ref(), &item.name)
            .quantities(old, item.stock)
            .details(format!("Catalog stock of {} set to {}", item.name, item.stock));
        self.record(log).await;
    }

    pub async fn login(&self, actor: Actor<'_>) {
        let log = ActivityLog::new(actor.id, actor.username, ActivityAction::Login)
            .details(format!("{} logged in", actor.username));
        self.record(log).await;
    }

    pub async fn logout(&self, actor: Actor<'_>) {
        let log = ActivityLog::new(actor.id, actor.username, ActivityAction::Logout)
            .details(format!("{} logged out", actor.username));
        self.record(log).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbResult;
    use crate::db::error::DbError;
    use crate::db::repo::MemoryActivityRepository;
    use crate::models::item::fixtures::item;

    struct BrokenRepo;

    #[async_trait::async_trait]
    impl ActivityRepo for BrokenRepo {
        async fn insert(&self, _log: &ActivityLog) -> DbResult<()> {
            Err(DbError::Decode("disk on fire".into()))
        }
        async fn list(&self, _f: &ActivityFilter, _p: Pagination) -> DbResult<(Vec<ActivityLog>, u64)> {
            Ok((Vec::new(), 0))
        }
        async fn stats(&self, _since: chrono::DateTime<Utc>) -> DbResult<ActivityStats> {
            Err(DbError::NotFound)
        }
        async fn users(&self) -> DbResult<Vec<UserActivity>> {
            Ok(Vec::new())
        }
    }

    const ALICE: Actor<'static> = Actor {
        id: "u1",
        username: "alice",
    };

    #[tokio::test]
    async fn failing_store_is_swallowed() {
        let svc = ActivityService::new(Arc::new(BrokenRepo));
        svc.login(ALICE).await;

        // an explicit append reports the failure
        let log = ActivityLog::new("u1", "alice", ActivityAction::Login);
        assert!(svc.append(log).await.is_err());
    }

    #[tokio::test]
    async fn users_are_listed_latest_first() {
        let svc = ActivityService::new(Arc::new(MemoryActivityRepository::new()));
        let t0 = Utc::now();
        for (id, name, minutes) in [("u1", "alice", 0), ("u2", "bob", 5), ("u1", "alice2", 10)] {
            let mut log = ActivityLog::new(id, name, ActivityAction::Login);
            log.created_at = t0 + Duration::minutes(minutes);
            svc.append(log).await.unwrap();
        }

        let users = svc.users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!((users[0].user_id.as_str(), users[0].username.as_str()), ("u1", "alice2"));
        assert_eq!(users[0].last_activity, t0 + Duration::minutes(10));
        assert_eq!(users[1].user_id, "u2");
    }

    #[tokio::test]
    async fn move_records_direction_and_quantities() {
        let svc = ActivityService::new(Arc::new(MemoryActivityRepository::new()));
        let chest = Chest::new("Garage".into());
        let spice = item(Some(42), "Spice");

        svc.item_moved(ALICE, &chest, &spice, QuantityChange { old: 0, new: 5 }).await;
        svc.item_moved(ALICE, &chest, &spice, QuantityChange { old: 5, new: 2 }).await;

        let page = svc.list(&ActivityFilter::default(), Pagination::default()).await.unwrap();
        assert_eq!(page.pagination.total, 2);

        let newest = &page.logs[0];
        assert_eq!(newest.action, ActivityAction::RemoveItem);
        assert_eq!(newest.item_id.as_deref(), Some("42"));
        assert_eq!((newest.old_quantity, newest.new_quantity), (Some(5), Some(2)));
        assert_eq!(page.logs[1].action, ActivityAction::AddItem);
    }

    #[tokio::test]
    async fn stats_count_distinct_users() {
        let svc = ActivityService::new(Arc::new(MemoryActivityRepository::new()));
        svc.login(ALICE).await;
        svc.login(ALICE).await;
        svc.logout(Actor { id: "u2", username: "bob" }).await;

        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.total_logs, 3);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.recent_activity, 3);
        assert_eq!(stats.action_breakdown[0].action, ActivityAction::Login);
        assert_eq!(stats.action_breakdown[0].count, 2);
    }

    #[test]
    fn pagination_flags() {
        let p = LogPagination::new(Pagination::new(Some(2), Some(10)), 25);
        assert_eq!(p.pages, 3);
        assert!(p.has_next);
        assert!(p.has_prev);

        let p = LogPagination::new(Pagination::new(Some(3), Some(10)), 25);
        assert!(!p.has_next);

        let p = LogPagination::new(Pagination::default(), 0);
        assert_eq!(p.pages, 0);
        assert!(!p.has_prev);
    }
}
