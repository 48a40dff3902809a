use crate::db::error::DbError;
use crate::db::repo::ChestRepo;
use crate::db::{Db, DbResult, map_row_opt, map_rows};
use crate::models::chest::{Chest, ChestEntry, ChestSummary};
use crate::models::types::ChestId;
use postgres_types::Json;
use std::sync::Arc;

pub struct ChestRepository {
    db: Arc<Db>,
}

impl ChestRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl ChestRepo for ChestRepository {
    async fn list(&self) -> DbResult<Vec<Chest>> {
        let client = self.db.get_client().await?;
        let rows = client
            .query(
                "SELECT id, name, entries, created_at FROM chests ORDER BY lower(name) ASC",
                &[],
            )
            .await?;

        map_rows(rows, Chest::try_from_row, "list chests")
    }

    async fn list_summaries(&self) -> DbResult<Vec<ChestSummary>> {
        let client = self.db.get_client().await?;
        let rows = client
            .query(
                r#"
                SELECT c.id, c.name, c.created_at,
                       jsonb_array_length(c.entries) AS entry_count,
                       COALESCE((
                           SELECT SUM((e->>'quantity')::bigint)
                             FROM jsonb_array_elements(c.entries) AS e
                       ), 0)::bigint AS total_quantity
                  FROM chests c
                 ORDER BY lower(c.name) ASC
                "#,
                &[],
            )
            .await?;

        map_rows(rows, ChestSummary::try_from_row, "chest summaries")
    }

    async fn get(&self, id: ChestId) -> DbResult<Option<Chest>> {
        let client = self.db.get_client().await?;
        let row = client
            .query_opt("SELECT id, name, entries, created_at FROM chests WHERE id = $1", &[&id])
            .await?;

        map_row_opt(row, Chest::try_from_row, "get chest")
    }

    async fn name_taken(&self, name: &str, except: Option<ChestId>) -> DbResult<bool> {
        let client = self.db.get_client().await?;
        let row = client
            .query_one(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM chests
                     WHERE lower(name) = lower($1)
                       AND ($2::uuid IS NULL OR id <> $2)
                ) AS taken
                "#,
                &[&name, &except],
            )
            .await?;

        Ok(row.try_get("taken")?)
    }

    async fn insert(&self, chest: &Chest) -> DbResult<()> {
        let client = self.db.get_client().await?;
        client
            .execute(
                "INSERT INTO chests (id, name, entries, created_at) VALUES ($1, $2, $3, $4)",
                &[&chest.id, &chest.name, &Json(&chest.entries), &chest.created_at],
            )
            .await
            .map_err(DbError::from_pg)?;

        Ok(())
    }

    async fn rename(&self, id: ChestId, name: &str) -> DbResult<bool> {
        let client = self.db.get_client().await?;
        let n = client
            .execute(
                "UPDATE chests SET name = $2, updated_at = now() WHERE id = $1",
                &[&id, &name],
            )
            .await
            .map_err(DbError::from_pg)?;

        Ok(n > 0)
    }

    async fn save_entries(&self, id: ChestId, entries: &[ChestEntry]) -> DbResult<bool> {
        let client = self.db.get_client().await?;
        let n = client
            .execute(
                "UPDATE chests SET entries = $2, updated_at = now() WHERE id = $1",
                &[&id, &Json(entries)],
            )
            .await?;

        Ok(n > 0)
    }

    async fn delete(&self, id: ChestId) -> DbResult<bool> {
        let client = self.db.get_client().await?;
        let n = client.execute("DELETE FROM chests WHERE id = $1", &[&id]).await?;

        Ok(n > 0)
    }
}
