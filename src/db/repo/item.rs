use crate::db::DbResult;
use crate::models::item::{Item, ItemFilter, ItemSort, NewItem, Pagination, StockOutcome, StockUpdate};
use crate::models::types::{CatalogId, ItemId};

#[async_trait::async_trait]
pub trait ItemRepo: Send + Sync {
    async fn get(&self, id: ItemId) -> DbResult<Option<Item>>;
    async fn get_by_catalog_id(&self, catalog_id: CatalogId) -> DbResult<Option<Item>>;
    /// Case-insensitive match on the full name
    async fn find_by_exact_name(&self, name: &str) -> DbResult<Option<Item>>;
    /// Batched lookup of every item referenced by either id kind
    async fn find_by_refs(&self, catalog_ids: &[CatalogId], item_ids: &[ItemId]) -> DbResult<Vec<Item>>;

    /// Returns one page of items plus the total number of matches
    async fn search(&self, filter: &ItemFilter, sort: ItemSort, page: Pagination) -> DbResult<(Vec<Item>, u64)>;
    /// Every match, unpaged
    async fn find_matching(&self, filter: &ItemFilter, sort: ItemSort) -> DbResult<Vec<Item>>;
    /// Every item whose name contains `needle` (case-insensitive), unranked
    async fn find_name_contains(&self, needle: &str) -> DbResult<Vec<Item>>;

    /// Updates the catalog stock counter. Never lets it go below zero.
    async fn adjust_stock(&self, catalog_id: CatalogId, update: StockUpdate) -> DbResult<StockOutcome>;

    /// Inserts or replaces an item, matched by catalog id when present, else by exact name
    async fn upsert(&self, item: NewItem) -> DbResult<Item>;
}
