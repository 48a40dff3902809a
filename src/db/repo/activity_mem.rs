use crate::db::DbResult;
use crate::db::repo::ActivityRepo;
use crate::models::activity::{ActionCount, ActivityFilter, ActivityLog, ActivityStats, UserActivity};
use crate::models::item::Pagination;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct MemoryActivityRepository {
    logs: RwLock<Vec<ActivityLog>>,
}

impl MemoryActivityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ActivityRepo for MemoryActivityRepository {
    async fn insert(&self, log: &ActivityLog) -> DbResult<()> {
        self.logs.write().push(log.clone());
        Ok(())
    }

    async fn list(&self, filter: &ActivityFilter, page: Pagination) -> DbResult<(Vec<ActivityLog>, u64)> {
        let logs = self.logs.read();
        // insertion order is chronological; walk it backwards for newest first
        let matches: Vec<&ActivityLog> = logs.iter().rev().filter(|l| filter.matches(l)).collect();
        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> DbResult<ActivityStats> {
        let logs = self.logs.read();

        let users: HashSet<&str> = logs.iter().map(|l| l.user_id.as_str()).collect();
        let chests: HashSet<_> = logs.iter().filter_map(|l| l.chest_id).collect();
        let recent = logs.iter().filter(|l| l.created_at >= recent_since).count();

        let mut per_action = HashMap::new();
        for l in logs.iter() {
            *per_action.entry(l.action).or_insert(0_i64) += 1;
        }
        let mut action_breakdown: Vec<ActionCount> = per_action
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect();
        action_breakdown.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.action.as_str().cmp(b.action.as_str())));

        Ok(ActivityStats {
            total_logs: logs.len() as i64,
            unique_users: users.len() as i64,
            unique_chests: chests.len() as i64,
            recent_activity: recent as i64,
            action_breakdown,
        })
    }

    async fn users(&self) -> DbResult<Vec<UserActivity>> {
        let logs = self.logs.read();

        let mut latest: HashMap<&str, &ActivityLog> = HashMap::new();
        for l in logs.iter() {
            // later entries are newer
            latest.insert(l.user_id.as_str(), l);
        }
        let mut users: Vec<UserActivity> = latest
            .into_values()
            .map(|l| UserActivity {
                user_id: l.user_id.clone(),
                username: l.username.clone(),
                last_activity: l.created_at,
            })
            .collect();
        users.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then_with(|| a.user_id.cmp(&b.user_id)));

        Ok(users)
    }
}
