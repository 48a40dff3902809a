use super::HttpAppCtx;
use super::extract::{ApiQuery, Authenticated, JsonBody};
use crate::error::{AppResult, DomainError};
use crate::models::item::{Item, ItemFilter, ItemRef, ItemSort, Page, Pagination, StockUpdate};
use crate::models::types::{CatalogId, ItemId};
use crate::services::catalog::{SEARCH_LIMIT, SUGGEST_LIMIT};
use crate::util::serde_helpers::{lenient_i64, non_blank};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;

pub(super) fn routes() -> Router<HttpAppCtx> {
    Router::new()
        .route("/items", get(list))
        .route("/items/suggest", get(suggest))
        .route("/items/search", get(search))
        .route("/items/export.csv", get(export_csv))
        .route("/items/exact/{name}", get(exact))
        .route("/items/{id}", get(detail))
        .route("/items/{id}/quantite", patch(update_stock))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default, with = "non_blank")]
    q: Option<String>,
    #[serde(default, with = "non_blank")]
    categorie: Option<String>,
    #[serde(default, with = "non_blank")]
    sous_categorie: Option<String>,
    #[serde(default, with = "non_blank")]
    tier: Option<String>,
    #[serde(default, with = "lenient_i64")]
    page: Option<i64>,
    #[serde(default, with = "lenient_i64")]
    limit: Option<i64>,
    #[serde(default, with = "non_blank")]
    sort: Option<String>,
}

#[derive(Deserialize)]
struct TextQuery {
    #[serde(default, with = "non_blank")]
    q: Option<String>,
    #[serde(default, with = "lenient_i64")]
    limit: Option<i64>,
}

impl TextQuery {
    fn limit_or(&self, default: usize) -> usize {
        self.limit
            .and_then(|l| usize::try_from(l).ok())
            .filter(|l| *l > 0)
            .map_or(default, |l| l.min(default))
    }
}

#[derive(Deserialize)]
struct StockBody {
    #[serde(default, with = "lenient_i64")]
    set: Option<i64>,
    #[serde(default, with = "lenient_i64")]
    inc: Option<i64>,
}

impl ListQuery {
    fn filter(&self) -> ItemFilter {
        ItemFilter {
            name_contains: self.q.clone(),
            category: self.categorie.clone(),
            sub_category: self.sous_categorie.clone(),
            tier: self.tier.clone(),
        }
    }
}

async fn list(
    State(ctx): State<HttpAppCtx>,
    _session: Authenticated,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<Json<Page<Item>>> {
    let filter = query.filter();
    let sort = query.sort.as_deref().map(ItemSort::parse).unwrap_or_default();
    let page = Pagination::new(query.page, query.limit);

    Ok(Json(ctx.registry.services.catalog.list(&filter, sort, page).await?))
}

/// Same filters as the listing; paging and sort are ignored.
async fn export_csv(
    State(ctx): State<HttpAppCtx>,
    _session: Authenticated,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let csv = ctx.registry.services.catalog.export_csv(&query.filter()).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"items_quantites.csv\""),
        ],
        csv,
    ))
}

async fn suggest(
    State(ctx): State<HttpAppCtx>,
    _session: Authenticated,
    ApiQuery(query): ApiQuery<TextQuery>,
) -> AppResult<Json<Vec<Item>>> {
    let q = query.q.as_deref().unwrap_or_default();
    let limit = query.limit_or(SUGGEST_LIMIT);
    Ok(Json(ctx.registry.services.catalog.suggest(q, limit).await?))
}

async fn search(
    State(ctx): State<HttpAppCtx>,
    _session: Authenticated,
    ApiQuery(query): ApiQuery<TextQuery>,
) -> AppResult<Json<Vec<Item>>> {
    let q = query.q.as_deref().unwrap_or_default();
    let limit = query.limit_or(SEARCH_LIMIT);
    Ok(Json(ctx.registry.services.catalog.suggest(q, limit).await?))
}

async fn exact(State(ctx): State<HttpAppCtx>, _session: Authenticated, Path(name): Path<String>) -> AppResult<Json<Item>> {
    Ok(Json(ctx.registry.services.catalog.exact(&name).await?))
}

/// `:id` is either the numeric catalog id or the database id.
async fn detail(State(ctx): State<HttpAppCtx>, _session: Authenticated, Path(id): Path<String>) -> AppResult<Json<Item>> {
    let catalog = &ctx.registry.services.catalog;
    let item = match id.trim().parse::<i64>() {
        Ok(n) => catalog
            .resolve(&ItemRef::Catalog(CatalogId(n)))
            .await
            .map_err(|e| match e {
                DomainError::ItemNotFound(what) => DomainError::NotFound(what),
                other => other,
            })?,
        Err(_) => {
            let id: ItemId = id
                .parse()
                .map_err(|_| DomainError::InvalidInput(format!("invalid item id {id:?}")))?;
            catalog.get(id).await?
        }
    };
    Ok(Json(item))
}

async fn update_stock(
    State(ctx): State<HttpAppCtx>,
    session: Authenticated,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StockBody>,
) -> AppResult<Json<Item>> {
    let catalog_id = id
        .trim()
        .parse::<i64>()
        .map(CatalogId)
        .map_err(|_| DomainError::InvalidInput(format!("invalid catalog id {id:?}")))?;

    let update = match (body.set, body.inc) {
        (Some(v), None) => StockUpdate::Set(v),
        (None, Some(d)) => StockUpdate::Inc(d),
        (None, None) => return Err(DomainError::InvalidInput("set or inc is required".into())),
        (Some(_), Some(_)) => return Err(DomainError::InvalidInput("only one of set or inc may be given".into())),
    };

    let (item, old) = ctx.registry.services.catalog.update_stock(catalog_id, update).await?;
    ctx.registry
        .services
        .activity
        .stock_updated(session.actor(), &item, old)
        .await;

    Ok(Json(item))
}
