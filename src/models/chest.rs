use crate::db::DbResult;
use crate::db::error::DbError;
use crate::error::{AppResult, DomainError};
use crate::models::item::{CanonicalItemRef, Item};
use crate::models::types::{CatalogId, ChestId, ItemId};
use chrono::{DateTime, Utc};
use postgres_types::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_postgres::Row;

pub const MAX_CHEST_NAME_LEN: usize = 50;

/// One line of a chest: an item and how many of it the chest holds.
///
/// Quantities are always strictly positive once persisted; zero rows are pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChestEntry", into = "RawChestEntry")]
pub struct ChestEntry {
    pub item: CanonicalItemRef,
    pub quantity: i64,
}

impl ChestEntry {
    pub fn new(item: CanonicalItemRef, quantity: i64) -> Self {
        Self { item, quantity }
    }
}

/// Stored/wire shape of an entry. Older rows may carry both ids; the numeric one wins.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    item_id: Option<CatalogId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    item_mongo_id: Option<ItemId>,
    quantity: i64,
}

impl TryFrom<RawChestEntry> for ChestEntry {
    type Error = String;

    fn try_from(raw: RawChestEntry) -> Result<Self, Self::Error> {
        if raw.quantity < 0 {
            return Err(format!("negative quantity {}", raw.quantity));
        }
        let item = match (raw.item_id, raw.item_mongo_id) {
            (Some(c), _) => CanonicalItemRef::Catalog(c),
            (None, Some(id)) => CanonicalItemRef::Database(id),
            (None, None) => return Err("chest entry without item reference".to_string()),
        };
        Ok(ChestEntry {
            item,
            quantity: raw.quantity,
        })
    }
}

impl From<ChestEntry> for RawChestEntry {
    fn from(e: ChestEntry) -> Self {
        RawChestEntry {
            item_id: e.item.catalog_id(),
            item_mongo_id: e.item.database_id(),
            quantity: e.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chest {
    #[serde(rename = "_id")]
    pub id: ChestId,
    pub name: String,
    #[serde(rename = "items")]
    pub entries: Vec<ChestEntry>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Quantity of one entry before and after a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityChange {
    pub old: i64,
    pub new: i64,
}

impl Chest {
    pub fn new(name: String) -> Self {
        Self {
            id: ChestId::new(),
            name,
            entries: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn try_from_row(row: &Row) -> DbResult<Self> {
        let entries: Json<Vec<ChestEntry>> = row
            .try_get("entries")
            .map_err(|e| DbError::Decode(format!("chest entries: {e}")))?;

        Ok(Self {
            id: row.try_get::<_, ChestId>("id")?,
            name: row.try_get("name")?,
            entries: entries.0,
            created_at: row.try_get("created_at")?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_quantity(&self) -> i64 {
        self.entries.iter().map(|e| e.quantity).sum()
    }

    pub fn quantity_of(&self, item: &CanonicalItemRef) -> i64 {
        self.entries
            .iter()
            .find(|e| e.item == *item)
            .map_or(0, |e| e.quantity)
    }

    /// Index of the entry holding `item`. The canonical key wins; an entry keyed by the
    /// other identity of the same item is used as a fallback.
    fn position_of(&self, item: &Item) -> Option<usize> {
        let canonical = item.canonical_ref();
        self.entries
            .iter()
            .position(|e| e.item == canonical)
            .or_else(|| self.entries.iter().position(|e| item.is_referenced_by(&e.item)))
    }

    /// Deposits (`delta > 0`) or withdraws (`delta < 0`) `item`.
    ///
    /// Fails without touching the chest when the withdrawal would go negative.
    pub fn apply_delta(&mut self, item: &Item, delta: i64) -> AppResult<QuantityChange> {
        if delta == 0 {
            return Err(DomainError::InvalidDelta);
        }

        let change = match self.position_of(item) {
            None => {
                if delta < 0 {
                    return Err(DomainError::InsufficientQuantity {
                        have: 0,
                        need: delta.saturating_neg(),
                    });
                }
                self.entries.push(ChestEntry::new(item.canonical_ref(), delta));
                QuantityChange { old: 0, new: delta }
            }
            Some(idx) => {
                let entry = &mut self.entries[idx];
                let next = entry
                    .quantity
                    .checked_add(delta)
                    .ok_or_else(|| DomainError::InvalidInput("quantity overflow".into()))?;
                if next < 0 {
                    return Err(DomainError::InsufficientQuantity {
                        have: entry.quantity,
                        need: delta.saturating_neg(),
                    });
                }
                let old = entry.quantity;
                entry.quantity = next;
                QuantityChange { old, new: next }
            }
        };

        self.prune_empty();
        Ok(change)
    }

    /// Merges `incoming` into this chest and returns the total quantity merged.
    ///
    /// Entries whose item is in `known` match the same way a move does, so a legacy key and
    /// the canonical key of one item end up on a single entry. Items that left the catalog
    /// only match their exact key. Unmatched entries are appended as they are.
    pub fn merge_from(&mut self, incoming: &[ChestEntry], known: &HashMap<CanonicalItemRef, Item>) -> AppResult<i64> {
        let mut moved: i64 = 0;
        for src in incoming {
            let idx = match known.get(&src.item) {
                Some(item) => self.position_of(item),
                None => self.entries.iter().position(|e| e.item == src.item),
            };
            match idx {
                Some(idx) => {
                    let dst = &mut self.entries[idx];
                    dst.quantity = dst
                        .quantity
                        .checked_add(src.quantity)
                        .ok_or_else(|| DomainError::InvalidInput("quantity overflow".into()))?;
                }
                None => self.entries.push(src.clone()),
            }
            moved = moved.saturating_add(src.quantity);
        }
        self.prune_empty();
        Ok(moved)
    }

    pub fn prune_empty(&mut self) {
        self.entries.retain(|e| e.quantity > 0);
    }

    pub fn summary(&self) -> ChestSummary {
        ChestSummary {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            entries: self.entries.len() as i64,
            total_quantity: self.total_quantity(),
        }
    }

    pub fn chest_ref(&self) -> ChestRef {
        ChestRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Trims and validates a chest name.
    pub fn normalize_name(raw: &str) -> AppResult<String> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(DomainError::Validation {
                field: "name",
                message: "cannot be empty".into(),
            });
        }
        if name.chars().count() > MAX_CHEST_NAME_LEN {
            return Err(DomainError::Validation {
                field: "name",
                message: format!("cannot exceed {MAX_CHEST_NAME_LEN} characters"),
            });
        }
        Ok(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChestSummary {
    #[serde(rename = "_id")]
    pub id: ChestId,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub entries: i64,
    #[serde(rename = "totalQuantity")]
    pub total_quantity: i64,
}

impl ChestSummary {
    pub fn try_from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            id: row.try_get::<_, ChestId>("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            entries: i64::from(row.try_get::<_, i32>("entry_count")?),
            total_quantity: row.try_get("total_quantity")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChestRef {
    #[serde(rename = "_id")]
    pub id: ChestId,
    pub name: String,
}

/// One row of a chest listing or of the aggregate, joined with the catalog item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<CatalogId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_mongo_id: Option<ItemId>,
    pub quantity: i64,
    pub item: Option<Item>,
}

impl LedgerRow {
    pub fn new(key: CanonicalItemRef, quantity: i64, item: Option<Item>) -> Self {
        Self {
            item_id: key.catalog_id(),
            item_mongo_id: key.database_id(),
            quantity,
            item,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChestItemsView {
    pub chest_id: ChestId,
    pub name: String,
    pub items: Vec<LedgerRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateView {
    pub total_items: usize,
    pub items: Vec<LedgerRow>,
}
