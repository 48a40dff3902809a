use crate::db::repo::ItemRepo;
use crate::error::{AppResult, DomainError};
use crate::models::item::{
    CanonicalItemRef, Item, ItemFilter, ItemRef, ItemSort, Page, Pagination, StockOutcome, StockUpdate,
};
use crate::models::types::{CatalogId, ItemId};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

pub const SUGGEST_LIMIT: usize = 10;
pub const SEARCH_LIMIT: usize = 25;

const EXPORT_HEADER: [&str; 5] = ["id", "nom", "categorie", "sous_categorie", "quantite"];

fn export_error(e: csv::Error) -> DomainError {
    DomainError::InternalError(format!("csv export: {e}"))
}

pub struct CatalogService {
    repo: Arc<dyn ItemRepo>,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn ItemRepo>) -> Self {
        Self { repo }
    }

    // ========================================================================
    // IDENTITY RESOLUTION
    // ========================================================================

    /// Resolves a caller supplied reference to exactly one catalog item.
    pub async fn resolve(&self, item_ref: &ItemRef) -> AppResult<Item> {
        let item = match item_ref {
            ItemRef::Catalog(c) => self.repo.get_by_catalog_id(*c).await?,
            ItemRef::Database(id) => self.repo.get(*id).await?,
            ItemRef::Name(name) => self.repo.find_by_exact_name(name).await?,
        };

        item.ok_or_else(|| DomainError::ItemNotFound(item_ref.to_string()))
    }

    /// Fetches the items behind a set of entry keys in one round trip.
    ///
    /// Keys whose item vanished from the catalog are absent from the map.
    pub async fn lookup(&self, keys: &[CanonicalItemRef]) -> AppResult<HashMap<CanonicalItemRef, Item>> {
        let catalog_ids: Vec<CatalogId> = keys.iter().filter_map(|k| k.catalog_id()).collect();
        let item_ids: Vec<ItemId> = keys.iter().filter_map(|k| k.database_id()).collect();

        let items = self.repo.find_by_refs(&catalog_ids, &item_ids).await?;

        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = items.iter().find(|i| i.is_referenced_by(key)) {
                out.insert(*key, item.clone());
            }
        }
        Ok(out)
    }

    // ========================================================================
    // BROWSING
    // ========================================================================

    pub async fn list(&self, filter: &ItemFilter, sort: ItemSort, page: Pagination) -> AppResult<Page<Item>> {
        let (items, total) = self.repo.search(filter, sort, page).await?;
        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    pub async fn get(&self, id: ItemId) -> AppResult<Item> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("item {id}")))
    }

    pub async fn exact(&self, name: &str) -> AppResult<Item> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::InvalidInput("name is required".into()));
        }
        self.repo
            .find_by_exact_name(name)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("item {name:?}")))
    }

    /// Name matches ranked prefix first, then word start, then anywhere; ties by name.
    pub async fn suggest(&self, q: &str, limit: usize) -> AppResult<Vec<Item>> {
        let q = q.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.repo.find_name_contains(q).await?;
        Ok(rank_matches(q, candidates, limit))
    }

    /// Every item matching `filter`, sorted by name, as CSV with a header row.
    pub async fn export_csv(&self, filter: &ItemFilter) -> AppResult<Vec<u8>> {
        let items = self.repo.find_matching(filter, ItemSort::default()).await?;

        let mut out = csv::Writer::from_writer(Vec::new());
        out.write_record(EXPORT_HEADER).map_err(export_error)?;
        for item in &items {
            out.write_record([
                item.catalog_id.map(|c| c.to_string()).unwrap_or_default(),
                item.name.clone(),
                item.category.clone(),
                item.sub_category.clone().unwrap_or_default(),
                item.stock.to_string(),
            ])
            .map_err(export_error)?;
        }

        tracing::debug!(rows = items.len(), "catalog exported");
        out.into_inner()
            .map_err(|e| DomainError::InternalError(format!("csv export: {}", e.error())))
    }

    // ========================================================================
    // STOCK COUNTER
    // ========================================================================

    /// Returns the updated item together with its previous stock.
    pub async fn update_stock(&self, catalog_id: CatalogId, update: StockUpdate) -> AppResult<(Item, i64)> {
        if let StockUpdate::Set(v) = update
            && v < 0
        {
            return Err(DomainError::Validation {
                field: "set",
                message: "must be >= 0".into(),
            });
        }

        // audit value only, may race with a concurrent update
        let before = match update {
            StockUpdate::Set(_) => self.repo.get_by_catalog_id(catalog_id).await?.map(|i| i.stock),
            StockUpdate::Inc(_) => None,
        };

        match self.repo.adjust_stock(catalog_id, update).await? {
            StockOutcome::Updated(item) => {
                tracing::debug!(catalog_id = %catalog_id, stock = item.stock, "stock updated");
                let old = before.unwrap_or(match update {
                    StockUpdate::Inc(d) => item.stock.saturating_sub(d),
                    StockUpdate::Set(v) => v,
                });
                Ok((item, old))
            }
            StockOutcome::NotFound => Err(DomainError::NotFound(format!("item {catalog_id}"))),
            StockOutcome::WouldGoNegative { have } => Err(DomainError::InsufficientQuantity {
                have,
                need: match update {
                    StockUpdate::Inc(d) => d.saturating_neg(),
                    StockUpdate::Set(v) => v,
                },
            }),
        }
    }
}

fn match_score(name: &str, starts: &Regex, word: &Regex) -> u8 {
    if starts.is_match(name) {
        3
    } else if word.is_match(name) {
        2
    } else {
        1
    }
}

fn rank_matches(q: &str, candidates: Vec<Item>, limit: usize) -> Vec<Item> {
    let escaped = regex::escape(q);
    let (Ok(starts), Ok(word)) = (
        Regex::new(&format!("(?i)^{escaped}")),
        Regex::new(&format!(r"(?i)(^|\s){escaped}")),
    ) else {
        // escaped input always compiles; keep the repo order if it ever does not
        let mut candidates = candidates;
        candidates.truncate(limit);
        return candidates;
    };

    let mut scored: Vec<(u8, Item)> = candidates
        .into_iter()
        .map(|i| (match_score(&i.name, &starts, &word), i))
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.name.cmp(&b.name)));

    scored.into_iter().take(limit).map(|(_, i)| i).collect()
}
