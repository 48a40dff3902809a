use crate::db::DbResult;
use crate::db::error::DbError;
use crate::db::repo::ChestRepo;
use crate::models::chest::{Chest, ChestEntry, ChestSummary};
use crate::models::types::ChestId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Chests kept in process memory. Name uniqueness is checked under the write lock.
#[derive(Default)]
pub struct MemoryChestRepository {
    chests: RwLock<HashMap<ChestId, Chest>>,
}

impl MemoryChestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn name_clash(chests: &HashMap<ChestId, Chest>, name: &str, except: Option<ChestId>) -> bool {
    let wanted = name.to_lowercase();
    chests
        .values()
        .any(|c| Some(c.id) != except && c.name.to_lowercase() == wanted)
}

fn sorted_by_name(mut chests: Vec<Chest>) -> Vec<Chest> {
    chests.sort_by_key(|c| c.name.to_lowercase());
    chests
}

#[async_trait::async_trait]
impl ChestRepo for MemoryChestRepository {
    async fn list(&self) -> DbResult<Vec<Chest>> {
        Ok(sorted_by_name(self.chests.read().values().cloned().collect()))
    }

    async fn list_summaries(&self) -> DbResult<Vec<ChestSummary>> {
        let chests = self.list().await?;
        Ok(chests.iter().map(Chest::summary).collect())
    }

    async fn get(&self, id: ChestId) -> DbResult<Option<Chest>> {
        Ok(self.chests.read().get(&id).cloned())
    }

    async fn name_taken(&self, name: &str, except: Option<ChestId>) -> DbResult<bool> {
        Ok(name_clash(&self.chests.read(), name, except))
    }

    async fn insert(&self, chest: &Chest) -> DbResult<()> {
        let mut chests = self.chests.write();
        if name_clash(&chests, &chest.name, None) || chests.contains_key(&chest.id) {
            return Err(DbError::UniqueViolation);
        }
        chests.insert(chest.id, chest.clone());
        Ok(())
    }

    async fn rename(&self, id: ChestId, name: &str) -> DbResult<bool> {
        let mut chests = self.chests.write();
        if !chests.contains_key(&id) {
            return Ok(false);
        }
        if name_clash(&chests, name, Some(id)) {
            return Err(DbError::UniqueViolation);
        }
        if let Some(c) = chests.get_mut(&id) {
            c.name = name.to_string();
        }
        Ok(true)
    }

    async fn save_entries(&self, id: ChestId, entries: &[ChestEntry]) -> DbResult<bool> {
        let mut chests = self.chests.write();
        match chests.get_mut(&id) {
            Some(c) => {
                c.entries = entries.to_vec();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: ChestId) -> DbResult<bool> {
        Ok(self.chests.write().remove(&id).is_some())
    }
}
