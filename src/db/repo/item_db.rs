use crate::db::error::DbError;
use crate::db::repo::ItemRepo;
use crate::db::{Db, DbResult, SqlFilter, like_contains, map_row_opt, map_rows};
use crate::models::item::{Item, ItemFilter, ItemSort, NewItem, Pagination, StockOutcome, StockUpdate};
use crate::models::types::{CatalogId, ItemId};
use postgres_types::Json;
use std::sync::Arc;

const ITEM_COLUMNS: &str = r#"
    id, catalog_id, name, category, sub_category, tier, is_unique,
    description, stats, image_url, sheet_url, quantity
"#;

pub struct ItemRepository {
    db: Arc<Db>,
}

impl ItemRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    async fn query_one_opt(
        &self,
        where_sql: &str,
        params: &[&(dyn postgres_types::ToSql + Sync)],
        ctx: &str,
    ) -> DbResult<Option<Item>> {
        let client = self.db.get_client().await?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE {where_sql} LIMIT 1");
        let row = client.query_opt(&sql, params).await?;
        map_row_opt(row, Item::try_from_row, ctx)
    }
}

fn build_filter(filter: &ItemFilter) -> SqlFilter {
    let mut f = SqlFilter::default();
    if let Some(q) = &filter.name_contains {
        f.push(like_contains(q), |p| format!("name ILIKE {p}"));
    }
    if let Some(c) = &filter.category {
        f.push(c.clone(), |p| format!("lower(category) = lower({p})"));
    }
    if let Some(sc) = &filter.sub_category {
        f.push(sc.clone(), |p| format!("lower(sub_category) = lower({p})"));
    }
    if let Some(t) = &filter.tier {
        f.push(t.trim().to_string(), |p| format!("lower(tier #>> '{{}}') = lower({p})"));
    }
    f
}

#[async_trait::async_trait]
impl ItemRepo for ItemRepository {
    async fn get(&self, id: ItemId) -> DbResult<Option<Item>> {
        self.query_one_opt("id = $1", &[&id], "item by id").await
    }

    async fn get_by_catalog_id(&self, catalog_id: CatalogId) -> DbResult<Option<Item>> {
        self.query_one_opt("catalog_id = $1", &[&catalog_id], "item by catalog id")
            .await
    }

    async fn find_by_exact_name(&self, name: &str) -> DbResult<Option<Item>> {
        self.query_one_opt("lower(name) = lower($1)", &[&name.trim()], "item by name")
            .await
    }

    async fn find_by_refs(&self, catalog_ids: &[CatalogId], item_ids: &[ItemId]) -> DbResult<Vec<Item>> {
        if catalog_ids.is_empty() && item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let catalog: Vec<i64> = catalog_ids.iter().map(|c| c.0).collect();
        let ids: Vec<uuid::Uuid> = item_ids.iter().map(|i| i.0).collect();

        let client = self.db.get_client().await?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE catalog_id = ANY($1) OR id = ANY($2)");
        let rows = client.query(&sql, &[&catalog, &ids]).await?;

        map_rows(rows, Item::try_from_row, "items by refs")
    }

    async fn search(&self, filter: &ItemFilter, sort: ItemSort, page: Pagination) -> DbResult<(Vec<Item>, u64)> {
        let client = self.db.get_client().await?;
        let mut f = build_filter(filter);

        let count_sql = format!("SELECT COUNT(*) AS n FROM items {}", f.where_sql());
        let total: i64 = client.query_one(&count_sql, &f.params()).await?.try_get("n")?;

        let limit = f.bind(page.limit);
        let offset = f.bind(page.offset());
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items {} {} LIMIT {limit} OFFSET {offset}",
            f.where_sql(),
            sort.order_by_sql(),
        );
        let rows = client.query(&sql, &f.params()).await?;
        let items = map_rows(rows, Item::try_from_row, "item search")?;

        Ok((items, total.max(0) as u64))
    }

    async fn find_matching(&self, filter: &ItemFilter, sort: ItemSort) -> DbResult<Vec<Item>> {
        let client = self.db.get_client().await?;
        let f = build_filter(filter);
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items {} {}", f.where_sql(), sort.order_by_sql());
        let rows = client.query(&sql, &f.params()).await?;

        map_rows(rows, Item::try_from_row, "item export")
    }

    async fn find_name_contains(&self, needle: &str) -> DbResult<Vec<Item>> {
        let client = self.db.get_client().await?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE name ILIKE $1 ORDER BY name ASC");
        let rows = client.query(&sql, &[&like_contains(needle)]).await?;

        map_rows(rows, Item::try_from_row, "item name contains")
    }

    async fn adjust_stock(&self, catalog_id: CatalogId, update: StockUpdate) -> DbResult<StockOutcome> {
        let (is_set, value) = match update {
            StockUpdate::Set(v) => (true, v),
            StockUpdate::Inc(d) => (false, d),
        };

        let client = self.db.get_client().await?;
        let sql = format!(
            r#"
            UPDATE items
               SET quantity = CASE WHEN $2 THEN $3 ELSE quantity + $3 END,
                   updated_at = now()
             WHERE catalog_id = $1
               AND (CASE WHEN $2 THEN $3 ELSE quantity + $3 END) >= 0
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = client.query_opt(&sql, &[&catalog_id, &is_set, &value]).await?;

        if let Some(item) = map_row_opt(row, Item::try_from_row, "adjust stock")? {
            return Ok(StockOutcome::Updated(item));
        }

        // Nothing updated: either unknown, or the guard rejected the new value
        Ok(match self.get_by_catalog_id(catalog_id).await? {
            Some(item) => StockOutcome::WouldGoNegative { have: item.stock },
            None => StockOutcome::NotFound,
        })
    }

    async fn upsert(&self, item: NewItem) -> DbResult<Item> {
        let existing = match item.catalog_id {
            Some(c) => self.get_by_catalog_id(c).await?,
            None => self.find_by_exact_name(&item.name).await?,
        };
        let id = existing.map(|e| e.id).unwrap_or_default();
        let item = item.into_item(id);

        let client = self.db.get_client().await?;
        let sql = format!(
            r#"
            INSERT INTO items ({ITEM_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                catalog_id = EXCLUDED.catalog_id,
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                sub_category = EXCLUDED.sub_category,
                tier = EXCLUDED.tier,
                is_unique = EXCLUDED.is_unique,
                description = EXCLUDED.description,
                stats = EXCLUDED.stats,
                image_url = EXCLUDED.image_url,
                sheet_url = EXCLUDED.sheet_url,
                quantity = EXCLUDED.quantity,
                updated_at = now()
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = client
            .query_one(
                &sql,
                &[
                    &item.id,
                    &item.catalog_id,
                    &item.name,
                    &item.category,
                    &item.sub_category,
                    &item.tier.as_ref().map(Json),
                    &item.unique,
                    &item.description,
                    &Json(&item.stats),
                    &item.image_url,
                    &item.sheet_url,
                    &item.stock.max(0),
                ],
            )
            .await
            .map_err(DbError::from_pg)?;

        Item::try_from_row(&row)
    }
}
