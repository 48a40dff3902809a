use crate::db::DbResult;
use crate::models::types::{CatalogId, ItemId};
use postgres_types::Json;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tokio_postgres::Row;

/// Item tier, either numeric (`3`) or symbolic (`"T3"`, `"Unique"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tier {
    Number(i64),
    Name(String),
}

impl Tier {
    /// Case-insensitive comparison against a textual filter value.
    pub fn matches(&self, wanted: &str) -> bool {
        self.to_string().eq_ignore_ascii_case(wanted.trim())
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Number(n) => write!(f, "{n}"),
            Tier::Name(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStat {
    #[serde(rename = "attribut")]
    pub attribute: String,
    #[serde(rename = "valeur")]
    pub value: serde_json::Value,
    #[serde(rename = "est_pourcentage", default)]
    pub is_percentage: bool,
    #[serde(rename = "mieux_plus_haut", default)]
    pub higher_is_better: bool,
}

/// Catalog item. Field names on the wire follow the catalog export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Database identity, always present
    #[serde(rename = "_id")]
    pub id: ItemId,

    /// Numeric game id, unique when present
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<CatalogId>,

    #[serde(rename = "nom")]
    pub name: String,

    #[serde(rename = "categorie", default)]
    pub category: String,

    #[serde(rename = "sous_categorie", default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    #[serde(default)]
    pub unique: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "statistiques", default)]
    pub stats: Vec<ItemStat>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(rename = "url_fiche", default, skip_serializing_if = "Option::is_none")]
    pub sheet_url: Option<String>,

    /// Free-standing stock counter of the catalog (independent of chests)
    #[serde(rename = "quantite", default)]
    pub stock: i64,
}

impl Item {
    pub fn try_from_row(row: &Row) -> DbResult<Self> {
        let tier: Option<Json<Tier>> = row.try_get("tier")?;
        let stats: Json<Vec<ItemStat>> = row.try_get("stats")?;

        Ok(Self {
            id: row.try_get::<_, ItemId>("id")?,
            catalog_id: row.try_get::<_, Option<CatalogId>>("catalog_id")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            sub_category: row.try_get("sub_category")?,
            tier: tier.map(|t| t.0),
            unique: row.try_get("is_unique")?,
            description: row.try_get("description")?,
            stats: stats.0,
            image_url: row.try_get("image_url")?,
            sheet_url: row.try_get("sheet_url")?,
            stock: row.try_get("quantity")?,
        })
    }

    /// Preferred identity: the numeric catalog id when there is one.
    pub fn canonical_ref(&self) -> CanonicalItemRef {
        match self.catalog_id {
            Some(c) => CanonicalItemRef::Catalog(c),
            None => CanonicalItemRef::Database(self.id),
        }
    }

    /// Whether `r` points at this item, in either identity namespace.
    pub fn is_referenced_by(&self, r: &CanonicalItemRef) -> bool {
        match r {
            CanonicalItemRef::Catalog(c) => self.catalog_id == Some(*c),
            CanonicalItemRef::Database(id) => self.id == *id,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.tier {
            Some(t) => format!("{} (Tier {t})", self.name),
            None => self.name.clone(),
        }
    }
}

/// Catalog item as delivered by an import file (no database identity yet).
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    #[serde(rename = "id", default)]
    pub catalog_id: Option<CatalogId>,
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(rename = "categorie", default)]
    pub category: String,
    #[serde(rename = "sous_categorie", default)]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "statistiques", default)]
    pub stats: Vec<ItemStat>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(rename = "url_fiche", default)]
    pub sheet_url: Option<String>,
    #[serde(rename = "quantite", default)]
    pub stock: i64,
}

impl NewItem {
    pub fn into_item(self, id: ItemId) -> Item {
        Item {
            id,
            catalog_id: self.catalog_id,
            name: self.name,
            category: self.category,
            sub_category: self.sub_category,
            tier: self.tier,
            unique: self.unique,
            description: self.description,
            stats: self.stats,
            image_url: self.image_url,
            sheet_url: self.sheet_url,
            stock: self.stock,
        }
    }
}

/// Item reference as supplied by a caller, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    Catalog(CatalogId),
    Database(ItemId),
    /// Exact item name, compared case-insensitively
    Name(String),
}

impl ItemRef {
    /// Builds a reference from the optional request fields; exactly one of them must be set.
    pub fn from_parts(
        catalog_id: Option<i64>,
        database_id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self, String> {
        let database_id = database_id.map(str::trim).filter(|s| !s.is_empty());
        let name = name.map(str::trim).filter(|s| !s.is_empty());

        match (catalog_id, database_id, name) {
            (Some(c), None, None) => Ok(ItemRef::Catalog(CatalogId(c))),
            (None, Some(raw), None) => raw
                .parse::<ItemId>()
                .map(ItemRef::Database)
                .map_err(|_| format!("itemMongoId {raw:?} is not a valid identifier")),
            (None, None, Some(n)) => Ok(ItemRef::Name(n.to_string())),
            (None, None, None) => Err("one of itemId, itemMongoId or name is required".into()),
            _ => Err("only one of itemId, itemMongoId or name may be given".into()),
        }
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemRef::Catalog(c) => write!(f, "itemId={c}"),
            ItemRef::Database(id) => write!(f, "itemMongoId={id}"),
            ItemRef::Name(n) => write!(f, "name={n:?}"),
        }
    }
}

/// Resolved item identity used as the key of chest entries and aggregates.
///
/// The two namespaces are kept apart: an entry keyed by database id is never
/// folded into the catalog id of the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalItemRef {
    Catalog(CatalogId),
    Database(ItemId),
}

impl CanonicalItemRef {
    pub fn catalog_id(&self) -> Option<CatalogId> {
        match self {
            CanonicalItemRef::Catalog(c) => Some(*c),
            CanonicalItemRef::Database(_) => None,
        }
    }

    pub fn database_id(&self) -> Option<ItemId> {
        match self {
            CanonicalItemRef::Catalog(_) => None,
            CanonicalItemRef::Database(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for CanonicalItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanonicalItemRef::Catalog(c) => write!(f, "{c}"),
            CanonicalItemRef::Database(id) => write!(f, "{id}"),
        }
    }
}

// ============================================================================
// CATALOG QUERIES
// ============================================================================

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Case-insensitive substring of the name
    pub name_contains: Option<String>,
    /// Exact (case-insensitive) category
    pub category: Option<String>,
    /// Exact (case-insensitive) sub-category
    pub sub_category: Option<String>,
    pub tier: Option<String>,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        if let Some(q) = &self.name_contains
            && !item.name.to_lowercase().contains(&q.to_lowercase())
        {
            return false;
        }
        if let Some(c) = &self.category
            && !item.category.eq_ignore_ascii_case(c)
        {
            return false;
        }
        if let Some(sc) = &self.sub_category
            && !item.sub_category.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(sc))
        {
            return false;
        }
        if let Some(t) = &self.tier
            && !item.tier.as_ref().is_some_and(|tier| tier.matches(t))
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    CatalogId,
    Category,
    SubCategory,
    Stock,
}

impl SortField {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "nom" | "name" => Some(SortField::Name),
            "id" | "catalogId" => Some(SortField::CatalogId),
            "categorie" | "category" => Some(SortField::Category),
            "sous_categorie" | "subCategory" => Some(SortField::SubCategory),
            "quantite" | "quantity" | "stock" => Some(SortField::Stock),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::CatalogId => "catalog_id",
            SortField::Category => "category",
            SortField::SubCategory => "sub_category",
            SortField::Stock => "quantity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSort {
    pub field: SortField,
    pub descending: bool,
}

impl Default for ItemSort {
    fn default() -> Self {
        Self {
            field: SortField::Name,
            descending: false,
        }
    }
}

impl ItemSort {
    /// Parses `field:dir` (e.g. `nom:asc`, `quantite:desc`). Unknown fields fall back to name order.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(2, ':');
        let field = parts.next().and_then(SortField::parse);
        let descending = parts.next().is_some_and(|d| d.trim().eq_ignore_ascii_case("desc"));

        match field {
            Some(field) => Self { field, descending },
            None => Self::default(),
        }
    }

    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        let ord = match self.field {
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::CatalogId => a.catalog_id.cmp(&b.catalog_id),
            SortField::Category => a.category.cmp(&b.category),
            SortField::SubCategory => a.sub_category.cmp(&b.sub_category),
            SortField::Stock => a.stock.cmp(&b.stock),
        };
        let ord = if self.descending { ord.reverse() } else { ord };
        ord.then_with(|| a.name.cmp(&b.name))
    }

    pub fn order_by_sql(&self) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        format!("ORDER BY {} {dir} NULLS LAST, name ASC", self.field.column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Page is at least 1, limit is clamped to `[1, MAX_PAGE_SIZE]`.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: i64,
    pub limit: i64,
}

/// Stock counter update for `PATCH /items/{id}/quantite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockUpdate {
    Set(i64),
    Inc(i64),
}

impl StockUpdate {
    pub fn apply(&self, current: i64) -> i64 {
        match self {
            StockUpdate::Set(v) => *v,
            StockUpdate::Inc(d) => current.saturating_add(*d),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StockOutcome {
    Updated(Item),
    NotFound,
    WouldGoNegative { have: i64 },
}
