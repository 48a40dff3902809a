use super::HttpAppCtx;
use super::extract::{Authorized, JsonBody, parse_chest_id};
use crate::error::{AppResult, DomainError};
use crate::models::chest::{AggregateView, Chest, ChestItemsView, ChestSummary};
use crate::models::item::ItemRef;
use crate::services::chest::{DeleteOutcome, DeleteRequest};
use crate::util::serde_helpers::{lenient_i64, non_blank};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub(super) fn routes() -> Router<HttpAppCtx> {
    Router::new()
        .route("/chests", get(list).post(create))
        .route("/chests/aggregate", get(aggregate))
        .route("/chests/{id}", get(detail).patch(update).delete(remove))
        .route("/chests/{id}/rename", patch(rename))
        .route("/chests/{id}/items", get(items))
        .route("/chests/{id}/move", post(move_item))
}

#[derive(Deserialize)]
struct CreateBody {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct RenameBody {
    #[serde(rename = "newName", alias = "name", default)]
    new_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveBody {
    #[serde(default, with = "lenient_i64")]
    item_id: Option<i64>,
    #[serde(default, with = "non_blank")]
    item_mongo_id: Option<String>,
    #[serde(default, with = "non_blank")]
    name: Option<String>,
    #[serde(default, with = "lenient_i64")]
    inc: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBody {
    #[serde(default, with = "non_blank")]
    migrate_to: Option<String>,
    #[serde(default)]
    confirmed: bool,
}

#[derive(Serialize)]
struct DeleteResponse {
    ok: bool,
    #[serde(flatten)]
    outcome: DeleteOutcome,
}

async fn list(State(ctx): State<HttpAppCtx>, _caller: Authorized) -> AppResult<Json<Vec<ChestSummary>>> {
    Ok(Json(ctx.registry.services.chest.list().await?))
}

async fn create(
    State(ctx): State<HttpAppCtx>,
    caller: Authorized,
    JsonBody(body): JsonBody<CreateBody>,
) -> AppResult<(StatusCode, Json<Chest>)> {
    let chest = ctx.registry.services.chest.create(caller.actor(), &body.name).await?;
    Ok((StatusCode::CREATED, Json(chest)))
}

async fn detail(State(ctx): State<HttpAppCtx>, _caller: Authorized, Path(id): Path<String>) -> AppResult<Json<Chest>> {
    let id = parse_chest_id(&id)?;
    Ok(Json(ctx.registry.services.chest.get(id).await?))
}

async fn update(
    State(ctx): State<HttpAppCtx>,
    caller: Authorized,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RenameBody>,
) -> AppResult<Json<Chest>> {
    let id = parse_chest_id(&id)?;
    let chest = ctx.registry.services.chest.rename(caller.actor(), id, &body.new_name).await?;
    Ok(Json(chest))
}

async fn rename(
    State(ctx): State<HttpAppCtx>,
    caller: Authorized,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RenameBody>,
) -> AppResult<Json<Value>> {
    let id = parse_chest_id(&id)?;
    let chest = ctx.registry.services.chest.rename(caller.actor(), id, &body.new_name).await?;

    Ok(Json(json!({
        "ok": true,
        "chest": {
            "_id": chest.id,
            "name": chest.name,
            "createdAt": chest.created_at,
        },
    })))
}

async fn items(
    State(ctx): State<HttpAppCtx>,
    _caller: Authorized,
    Path(id): Path<String>,
) -> AppResult<Json<ChestItemsView>> {
    let id = parse_chest_id(&id)?;
    Ok(Json(ctx.registry.services.chest.items(id).await?))
}

async fn move_item(
    State(ctx): State<HttpAppCtx>,
    caller: Authorized,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<MoveBody>,
) -> AppResult<Json<Value>> {
    let id = parse_chest_id(&id)?;
    let item_ref = ItemRef::from_parts(body.item_id, body.item_mongo_id.as_deref(), body.name.as_deref())
        .map_err(DomainError::InvalidReference)?;
    let delta = body.inc.ok_or(DomainError::InvalidDelta)?;

    ctx.registry
        .services
        .chest
        .move_item(caller.actor(), id, &item_ref, delta)
        .await?;

    Ok(Json(json!({ "ok": true })))
}

async fn remove(
    State(ctx): State<HttpAppCtx>,
    caller: Authorized,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<DeleteBody>,
) -> AppResult<Json<DeleteResponse>> {
    let id = parse_chest_id(&id)?;
    let migrate_to = body
        .migrate_to
        .as_deref()
        .map(|raw| {
            raw.parse()
                .map_err(|_| DomainError::InvalidInput(format!("invalid migrateTo {raw:?}")))
        })
        .transpose()?;

    let req = DeleteRequest {
        migrate_to,
        confirmed: body.confirmed,
    };
    let outcome = ctx.registry.services.chest.delete(caller.actor(), id, req).await?;

    Ok(Json(DeleteResponse { ok: true, outcome }))
}

async fn aggregate(State(ctx): State<HttpAppCtx>, _caller: Authorized) -> AppResult<Json<AggregateView>> {
    Ok(Json(ctx.registry.services.chest.aggregate().await?))
}
