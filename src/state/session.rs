use crate::models::caller::SessionUser;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;

const TOKEN_LEN: usize = 40;
pub const BOT_TOKEN_PREFIX: &str = "bot_";

struct Session {
    user: SessionUser,
    last_seen: DateTime<Utc>,
}

/// Bearer token to session mapping.
///
/// A session dies after `idle_ttl` without use; every successful lookup extends it.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl,
        }
    }

    /// Registers `user` under a freshly generated token and returns the token.
    pub fn open(&self, user: SessionUser, now: DateTime<Utc>) -> String {
        let token = generate_token();
        self.sessions.insert(token.clone(), Session { user, last_seen: now });
        token
    }

    pub fn get(&self, token: &str, now: DateTime<Utc>) -> Option<SessionUser> {
        let mut session = self.sessions.get_mut(token)?;
        if now - session.last_seen >= self.idle_ttl {
            drop(session);
            self.sessions.remove_if(token, |_, s| now - s.last_seen >= self.idle_ttl);
            return None;
        }
        session.last_seen = now;
        Some(session.user.clone())
    }

    pub fn close(&self, token: &str) -> Option<SessionUser> {
        self.sessions.remove(token).map(|(_, s)| s.user)
    }

    /// Drops every idle session. Returns how many were removed.
    pub fn expire(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| now - s.last_seen < self.idle_ttl);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn generate_token() -> String {
    let random: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect();
    format!("{BOT_TOKEN_PREFIX}{random}")
}
