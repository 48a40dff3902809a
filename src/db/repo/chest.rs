use crate::db::DbResult;
use crate::models::chest::{Chest, ChestEntry, ChestSummary};
use crate::models::types::ChestId;

#[async_trait::async_trait]
pub trait ChestRepo: Send + Sync {
    async fn list(&self) -> DbResult<Vec<Chest>>;
    /// Summaries without the entry lists, sorted by name
    async fn list_summaries(&self) -> DbResult<Vec<ChestSummary>>;
    async fn get(&self, id: ChestId) -> DbResult<Option<Chest>>;

    /// Whether another chest (other than `except`) already uses `name`, case-insensitively
    async fn name_taken(&self, name: &str, except: Option<ChestId>) -> DbResult<bool>;

    /// Fails with `DbError::UniqueViolation` when the name is taken
    async fn insert(&self, chest: &Chest) -> DbResult<()>;
    /// Returns false when the chest does not exist. Fails with `DbError::UniqueViolation` when the name is taken.
    async fn rename(&self, id: ChestId, name: &str) -> DbResult<bool>;

    /// Replaces the whole entry list in one write
    async fn save_entries(&self, id: ChestId, entries: &[ChestEntry]) -> DbResult<bool>;
    async fn delete(&self, id: ChestId) -> DbResult<bool>;
}
