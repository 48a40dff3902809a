use crate::db::DbResult;
use crate::db::error::DbError;
use crate::db::repo::ItemRepo;
use crate::models::item::{Item, ItemFilter, ItemSort, NewItem, Pagination, StockOutcome, StockUpdate};
use crate::models::types::{CatalogId, ItemId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Catalog kept in process memory.
#[derive(Default)]
pub struct MemoryItemRepository {
    items: RwLock<HashMap<ItemId, Item>>,
}

impl MemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the catalog with fully formed items
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let map = items.into_iter().map(|i| (i.id, i)).collect();
        Self { items: RwLock::new(map) }
    }

    fn find(&self, pred: impl Fn(&Item) -> bool) -> Option<Item> {
        self.items.read().values().find(|i| pred(i)).cloned()
    }
}

#[async_trait::async_trait]
impl ItemRepo for MemoryItemRepository {
    async fn get(&self, id: ItemId) -> DbResult<Option<Item>> {
        Ok(self.items.read().get(&id).cloned())
    }

    async fn get_by_catalog_id(&self, catalog_id: CatalogId) -> DbResult<Option<Item>> {
        Ok(self.find(|i| i.catalog_id == Some(catalog_id)))
    }

    async fn find_by_exact_name(&self, name: &str) -> DbResult<Option<Item>> {
        let wanted = name.trim().to_lowercase();
        Ok(self.find(|i| i.name.to_lowercase() == wanted))
    }

    async fn find_by_refs(&self, catalog_ids: &[CatalogId], item_ids: &[ItemId]) -> DbResult<Vec<Item>> {
        let items = self.items.read();
        Ok(items
            .values()
            .filter(|i| item_ids.contains(&i.id) || i.catalog_id.is_some_and(|c| catalog_ids.contains(&c)))
            .cloned()
            .collect())
    }

    async fn search(&self, filter: &ItemFilter, sort: ItemSort, page: Pagination) -> DbResult<(Vec<Item>, u64)> {
        let mut matches: Vec<Item> = self
            .items
            .read()
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        matches.sort_by(|a, b| sort.compare(a, b));

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();

        Ok((items, total))
    }

    async fn find_matching(&self, filter: &ItemFilter, sort: ItemSort) -> DbResult<Vec<Item>> {
        let mut matches: Vec<Item> = self
            .items
            .read()
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        matches.sort_by(|a, b| sort.compare(a, b));
        Ok(matches)
    }

    async fn find_name_contains(&self, needle: &str) -> DbResult<Vec<Item>> {
        let needle = needle.to_lowercase();
        let mut matches: Vec<Item> = self
            .items
            .read()
            .values()
            .filter(|i| i.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(matches)
    }

    async fn adjust_stock(&self, catalog_id: CatalogId, update: StockUpdate) -> DbResult<StockOutcome> {
        let mut items = self.items.write();
        let Some(item) = items.values_mut().find(|i| i.catalog_id == Some(catalog_id)) else {
            return Ok(StockOutcome::NotFound);
        };

        let next = update.apply(item.stock);
        if next < 0 {
            return Ok(StockOutcome::WouldGoNegative { have: item.stock });
        }
        item.stock = next;

        Ok(StockOutcome::Updated(item.clone()))
    }

    async fn upsert(&self, new: NewItem) -> DbResult<Item> {
        let mut items = self.items.write();

        let existing = match new.catalog_id {
            Some(c) => items.values().find(|i| i.catalog_id == Some(c)).map(|i| i.id),
            None => {
                let wanted = new.name.trim().to_lowercase();
                items.values().find(|i| i.name.to_lowercase() == wanted).map(|i| i.id)
            }
        };
        let id = existing.unwrap_or_default();

        // catalog ids stay unique
        if let Some(c) = new.catalog_id
            && items.values().any(|i| i.id != id && i.catalog_id == Some(c))
        {
            return Err(DbError::UniqueViolation);
        }

        let mut item = new.into_item(id);
        item.stock = item.stock.max(0);
        items.insert(id, item.clone());

        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::fixtures::item;

    fn new_item(catalog_id: Option<i64>, name: &str, stock: i64) -> NewItem {
        serde_json::from_value(serde_json::json!({
            "id": catalog_id,
            "nom": name,
            "categorie": "Ressources",
            "quantite": stock,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn upsert_matches_by_catalog_id_then_name() {
        let repo = MemoryItemRepository::new();

        let a = repo.upsert(new_item(Some(1), "Water", 3)).await.unwrap();
        let a2 = repo.upsert(new_item(Some(1), "Water (renamed)", 4)).await.unwrap();
        assert_eq!(a.id, a2.id);
        assert_eq!(a2.name, "Water (renamed)");

        let b = repo.upsert(new_item(None, "Relic", 0)).await.unwrap();
        let b2 = repo.upsert(new_item(None, "relic", 1)).await.unwrap();
        assert_eq!(b.id, b2.id);

        assert_eq!(repo.items.read().len(), 2);
    }

    #[tokio::test]
    async fn stock_never_goes_negative() {
        let repo = MemoryItemRepository::with_items([item(Some(7), "Stillsuit")]);

        let out = repo.adjust_stock(CatalogId(7), StockUpdate::Inc(2)).await.unwrap();
        assert!(matches!(out, StockOutcome::Updated(ref i) if i.stock == 2));

        let out = repo.adjust_stock(CatalogId(7), StockUpdate::Inc(-3)).await.unwrap();
        assert!(matches!(out, StockOutcome::WouldGoNegative { have: 2 }));

        let out = repo.adjust_stock(CatalogId(8), StockUpdate::Set(1)).await.unwrap();
        assert!(matches!(out, StockOutcome::NotFound));
    }

    #[tokio::test]
    async fn search_pages_sorted_results() {
        let repo = MemoryItemRepository::with_items((1..=25).map(|n| item(Some(n), &format!("Item {n:02}"))));

        let (page, total) = repo
            .search(&ItemFilter::default(), ItemSort::default(), Pagination::new(Some(2), Some(10)))
            .await
            .unwrap();
        assert_eq!(total, 25);
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].name, "Item 11");
    }
}
