use crate::db::repo::ActivityRepo;
use crate::db::{Db, DbResult, SqlFilter, map_rows};
use crate::models::activity::{
    ActionCount, ActivityAction, ActivityFilter, ActivityLog, ActivityStats, UserActivity,
};
use crate::models::item::Pagination;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const LOG_COLUMNS: &str = r#"
    id, user_id, username, action, chest_id, chest_name, item_id, item_name,
    old_quantity, new_quantity, details, created_at
"#;

pub struct ActivityRepository {
    db: Arc<Db>,
}

impl ActivityRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

fn build_filter(filter: &ActivityFilter) -> SqlFilter {
    let mut f = SqlFilter::default();
    if let Some(u) = &filter.user_id {
        f.push(u.clone(), |p| format!("user_id = {p}"));
    }
    if !filter.actions.is_empty() {
        let actions: Vec<String> = filter.actions.iter().map(|a| a.as_str().to_string()).collect();
        f.push(actions, |p| format!("action = ANY({p})"));
    }
    if let Some(c) = filter.chest_id {
        f.push(c, |p| format!("chest_id = {p}"));
    }
    if let Some(s) = filter.since {
        f.push(s, |p| format!("created_at >= {p}"));
    }
    if let Some(u) = filter.until {
        f.push(u, |p| format!("created_at <= {p}"));
    }
    f
}

#[async_trait::async_trait]
impl ActivityRepo for ActivityRepository {
    async fn insert(&self, log: &ActivityLog) -> DbResult<()> {
        let client = self.db.get_client().await?;
        let sql = format!("INSERT INTO activity_logs ({LOG_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)");
        client
            .execute(
                &sql,
                &[
                    &log.id,
                    &log.user_id,
                    &log.username,
                    &log.action,
                    &log.chest_id,
                    &log.chest_name,
                    &log.item_id,
                    &log.item_name,
                    &log.old_quantity,
                    &log.new_quantity,
                    &log.details,
                    &log.created_at,
                ],
            )
            .await?;

        Ok(())
    }

    async fn list(&self, filter: &ActivityFilter, page: Pagination) -> DbResult<(Vec<ActivityLog>, u64)> {
        let client = self.db.get_client().await?;
        let mut f = build_filter(filter);

        let count_sql = format!("SELECT COUNT(*) AS n FROM activity_logs {}", f.where_sql());
        let total: i64 = client.query_one(&count_sql, &f.params()).await?.try_get("n")?;

        let limit = f.bind(page.limit);
        let offset = f.bind(page.offset());
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM activity_logs {} ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}",
            f.where_sql()
        );
        let rows = client.query(&sql, &f.params()).await?;
        let logs = map_rows(rows, ActivityLog::try_from_row, "list activity")?;

        Ok((logs, total.max(0) as u64))
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> DbResult<ActivityStats> {
        let client = self.db.get_client().await?;

        let row = client
            .query_one(
                r#"
                SELECT COUNT(*) AS total,
                       COUNT(DISTINCT user_id) AS users,
                       COUNT(DISTINCT chest_id) AS chests,
                       COUNT(*) FILTER (WHERE created_at >= $1) AS recent
                  FROM activity_logs
                "#,
                &[&recent_since],
            )
            .await?;

        let rows = client
            .query(
                "SELECT action, COUNT(*) AS n FROM activity_logs GROUP BY action ORDER BY n DESC, action ASC",
                &[],
            )
            .await?;
        let action_breakdown = map_rows(
            rows,
            |r| {
                Ok(ActionCount {
                    action: r.try_get::<_, ActivityAction>("action")?,
                    count: r.try_get("n")?,
                })
            },
            "activity breakdown",
        )?;

        Ok(ActivityStats {
            total_logs: row.try_get("total")?,
            unique_users: row.try_get("users")?,
            unique_chests: row.try_get("chests")?,
            recent_activity: row.try_get("recent")?,
            action_breakdown,
        })
    }

    async fn users(&self) -> DbResult<Vec<UserActivity>> {
        let client = self.db.get_client().await?;
        let rows = client
            .query(
                r#"
                SELECT user_id, username, last_activity
                  FROM (SELECT DISTINCT ON (user_id) user_id, username, created_at AS last_activity
                          FROM activity_logs
                         ORDER BY user_id, created_at DESC) u
                 ORDER BY last_activity DESC
                "#,
                &[],
            )
            .await?;

        map_rows(rows, UserActivity::try_from_row, "activity users")
    }
}
