use crate::models::caller::RoleGrant;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than the TTL, usable without asking the provider
    Fresh,
    /// Past the TTL but inside the stale window, usable only when the provider fails
    Stale,
}

/// Process-scoped role snapshots keyed by user id.
pub struct RoleCache {
    entries: DashMap<String, RoleGrant>,
    ttl: Duration,
    stale_after: Duration,
}

impl RoleCache {
    pub fn new(ttl: Duration, stale_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stale_after: stale_after.max(ttl),
        }
    }

    pub fn get(&self, user_id: &str, now: DateTime<Utc>) -> Option<(RoleGrant, Freshness)> {
        let grant = self.entries.get(user_id)?.value().clone();
        let age = now - grant.checked_at;

        if age < self.ttl {
            Some((grant, Freshness::Fresh))
        } else if age < self.stale_after {
            Some((grant, Freshness::Stale))
        } else {
            None
        }
    }

    pub fn put(&self, user_id: &str, grant: RoleGrant) {
        self.entries.insert(user_id.to_string(), grant);
    }

    pub fn invalidate(&self, user_id: &str) {
        self.entries.remove(user_id);
    }

    /// Drops every entry past the stale window. Returns how many were removed.
    pub fn expire(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, g| now - g.checked_at < self.stale_after);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
