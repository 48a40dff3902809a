use crate::db::DbResult;
use crate::models::types::{ChestId, LogId};
use chrono::{DateTime, Utc};
use postgres_types::private::BytesMut;
use postgres_types::{FromSql, IsNull, ToSql, Type};
use serde::{Deserialize, Serialize};
use std::error::Error;
use tokio_postgres::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    CreateChest,
    RenameChest,
    DeleteChest,
    AddItem,
    RemoveItem,
    UpdateItemQuantity,
    Login,
    Logout,
}

impl ActivityAction {
    pub const ALL: [ActivityAction; 8] = [
        ActivityAction::CreateChest,
        ActivityAction::RenameChest,
        ActivityAction::DeleteChest,
        ActivityAction::AddItem,
        ActivityAction::RemoveItem,
        ActivityAction::UpdateItemQuantity,
        ActivityAction::Login,
        ActivityAction::Logout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::CreateChest => "CREATE_CHEST",
            ActivityAction::RenameChest => "RENAME_CHEST",
            ActivityAction::DeleteChest => "DELETE_CHEST",
            ActivityAction::AddItem => "ADD_ITEM",
            ActivityAction::RemoveItem => "REMOVE_ITEM",
            ActivityAction::UpdateItemQuantity => "UPDATE_ITEM_QUANTITY",
            ActivityAction::Login => "LOGIN",
            ActivityAction::Logout => "LOGOUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s.trim())
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActivityAction::CreateChest | ActivityAction::RenameChest | ActivityAction::DeleteChest => {
                ActionKind::Chest
            }
            ActivityAction::AddItem | ActivityAction::RemoveItem | ActivityAction::UpdateItemQuantity => {
                ActionKind::Item
            }
            ActivityAction::Login | ActivityAction::Logout => ActionKind::Auth,
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for ActivityAction {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        self.as_str().to_sql(ty, out)
    }

    fn accepts(ty: &Type) -> bool {
        ty == &Type::TEXT
    }

    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        self.to_sql(ty, out)
    }
}

impl FromSql<'_> for ActivityAction {
    fn from_sql(ty: &Type, raw: &[u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let s = String::from_sql(ty, raw)?;
        ActivityAction::parse(&s).ok_or_else(|| format!("Unknown activity action: {}", s).into())
    }

    fn accepts(ty: &Type) -> bool {
        ty == &Type::TEXT
    }
}

/// Coarse grouping used by the `actionType` log filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Chest,
    Item,
    Auth,
}

impl ActionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chest" => Some(ActionKind::Chest),
            "item" => Some(ActionKind::Item),
            "auth" => Some(ActionKind::Auth),
            _ => None,
        }
    }

    pub fn actions(&self) -> Vec<ActivityAction> {
        ActivityAction::ALL.into_iter().filter(|a| a.kind() == *self).collect()
    }
}

/// Audit record of a state-changing operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    #[serde(rename = "_id")]
    pub id: LogId,
    pub user_id: String,
    pub username: String,
    pub action: ActivityAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chest_id: Option<ChestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chest_name: Option<String>,
    /// Canonical item reference in its display form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(user_id: &str, username: &str, action: ActivityAction) -> Self {
        Self {
            id: LogId::new(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            action,
            chest_id: None,
            chest_name: None,
            item_id: None,
            item_name: None,
            old_quantity: None,
            new_quantity: None,
            details: None,
            created_at: Utc::now(),
        }
    }

    pub fn chest(mut self, id: ChestId, name: &str) -> Self {
        self.chest_id = Some(id);
        self.chest_name = Some(name.to_string());
        self
    }

    pub fn item(mut self, id: impl ToString, name: &str) -> Self {
        self.item_id = Some(id.to_string());
        self.item_name = Some(name.to_string());
        self
    }

    pub fn quantities(mut self, old: i64, new: i64) -> Self {
        self.old_quantity = Some(old);
        self.new_quantity = Some(new);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn try_from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            id: row.try_get::<_, LogId>("id")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            action: row.try_get("action")?,
            chest_id: row.try_get::<_, Option<ChestId>>("chest_id")?,
            chest_name: row.try_get("chest_name")?,
            item_id: row.try_get("item_id")?,
            item_name: row.try_get("item_name")?,
            old_quantity: row.try_get("old_quantity")?,
            new_quantity: row.try_get("new_quantity")?,
            details: row.try_get("details")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub user_id: Option<String>,
    /// Empty means any action
    pub actions: Vec<ActivityAction>,
    pub chest_id: Option<ChestId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ActivityFilter {
    pub fn matches(&self, log: &ActivityLog) -> bool {
        if let Some(u) = &self.user_id
            && log.user_id != *u
        {
            return false;
        }
        if !self.actions.is_empty() && !self.actions.contains(&log.action) {
            return false;
        }
        if self.chest_id.is_some() && log.chest_id != self.chest_id {
            return false;
        }
        if self.since.is_some_and(|s| log.created_at < s) {
            return false;
        }
        if self.until.is_some_and(|u| log.created_at > u) {
            return false;
        }
        true
    }
}

/// One user seen in the audit trail, with the name of their latest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub username: String,
    pub last_activity: DateTime<Utc>,
}

impl UserActivity {
    pub fn try_from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            last_activity: row.try_get("last_activity")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCount {
    #[serde(rename = "_id")]
    pub action: ActivityAction,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total_logs: i64,
    pub unique_users: i64,
    pub unique_chests: i64,
    /// Entries of the last 24 hours
    pub recent_activity: i64,
    /// Sorted by count, most frequent first
    pub action_breakdown: Vec<ActionCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_round_trip_through_their_wire_names() {
        for a in ActivityAction::ALL {
            assert_eq!(ActivityAction::parse(a.as_str()), Some(a));
            assert_eq!(serde_json::to_value(a).unwrap(), serde_json::json!(a.as_str()));
        }
        assert_eq!(ActivityAction::parse("DROP_TABLE"), None);
    }

    #[test]
    fn kinds_group_actions() {
        assert_eq!(
            ActionKind::Chest.actions(),
            vec![ActivityAction::CreateChest, ActivityAction::RenameChest, ActivityAction::DeleteChest]
        );
        assert_eq!(ActionKind::parse("AUTH"), Some(ActionKind::Auth));
        assert_eq!(ActionKind::Auth.actions(), vec![ActivityAction::Login, ActivityAction::Logout]);
    }

    #[test]
    fn filter_combines_criteria() {
        let chest = ChestId::new();
        let log = ActivityLog::new("u1", "alice", ActivityAction::AddItem).chest(chest, "Garage");

        let f = ActivityFilter {
            user_id: Some("u1".into()),
            actions: ActionKind::Item.actions(),
            chest_id: Some(chest),
            ..Default::default()
        };
        assert!(f.matches(&log));

        let f = ActivityFilter {
            actions: vec![ActivityAction::Login],
            ..Default::default()
        };
        assert!(!f.matches(&log));

        let f = ActivityFilter {
            since: Some(log.created_at + chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!f.matches(&log));
    }
}
