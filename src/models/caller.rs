use chrono::{DateTime, Utc};
use serde::Serialize;

/// Identity attached to a bearer token by `POST /auth/bot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    /// Discord user id
    pub id: String,
    pub username: String,
    pub is_bot: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionUser {
    pub fn bot(id: &str, username: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            is_bot: true,
            created_at: Utc::now(),
        }
    }
}

/// Authorized caller, after the role check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub last_role_check: DateTime<Utc>,
}

/// Role snapshot of one user as cached between provider lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub roles: Vec<String>,
    pub has_required_role: bool,
    pub username: String,
    pub checked_at: DateTime<Utc>,
}
