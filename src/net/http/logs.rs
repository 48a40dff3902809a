use super::HttpAppCtx;
use super::extract::{ApiQuery, Authorized, JsonBody, parse_chest_id};
use crate::error::{AppResult, DomainError};
use crate::models::activity::{ActionKind, ActivityAction, ActivityFilter, ActivityLog, ActivityStats, UserActivity};
use crate::models::item::Pagination;
use crate::services::activity::LogPage;
use crate::util::serde_helpers::{lenient_i64, non_blank};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

pub(super) fn routes() -> Router<HttpAppCtx> {
    Router::new()
        .route("/logs", get(list).post(create))
        .route("/logs/stats", get(stats))
        .route("/logs/users", get(users))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogQuery {
    #[serde(default, with = "lenient_i64")]
    page: Option<i64>,
    #[serde(default, with = "lenient_i64")]
    limit: Option<i64>,
    #[serde(default, with = "non_blank")]
    user_id: Option<String>,
    #[serde(default, with = "non_blank")]
    action: Option<String>,
    #[serde(default, with = "non_blank")]
    action_type: Option<String>,
    #[serde(default, with = "non_blank")]
    chest_id: Option<String>,
    #[serde(default, with = "non_blank")]
    start_date: Option<String>,
    #[serde(default, with = "non_blank")]
    end_date: Option<String>,
}

/// Client-submitted entry; the author is always the caller.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewLogBody {
    #[serde(default, with = "non_blank")]
    action: Option<String>,
    #[serde(default, with = "non_blank")]
    chest_id: Option<String>,
    #[serde(default, with = "non_blank")]
    chest_name: Option<String>,
    #[serde(default, with = "non_blank")]
    item_id: Option<String>,
    #[serde(default, with = "non_blank")]
    item_name: Option<String>,
    #[serde(default, with = "lenient_i64")]
    old_quantity: Option<i64>,
    #[serde(default, with = "lenient_i64")]
    new_quantity: Option<i64>,
    #[serde(default, with = "non_blank")]
    details: Option<String>,
}

impl NewLogBody {
    fn into_log(self, user_id: &str, username: &str) -> AppResult<ActivityLog> {
        let action = self.action.as_deref().ok_or(DomainError::Validation {
            field: "action",
            message: "is required".into(),
        })?;
        let mut log = ActivityLog::new(user_id, username, parse_action(action)?);

        log.chest_id = self.chest_id.as_deref().map(parse_chest_id).transpose()?;
        log.chest_name = self.chest_name;
        log.item_id = self.item_id;
        log.item_name = self.item_name;
        log.old_quantity = self.old_quantity;
        log.new_quantity = self.new_quantity;
        log.details = self.details;
        Ok(log)
    }
}

fn parse_action(raw: &str) -> AppResult<ActivityAction> {
    ActivityAction::parse(raw).ok_or_else(|| DomainError::InvalidInput(format!("unknown action {raw:?}")))
}

/// RFC 3339 timestamp, or a plain `YYYY-MM-DD` taken at `time` of that day (UTC).
fn parse_bound(field: &'static str, raw: &str, time: NaiveTime) -> AppResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(time).and_utc())
        .map_err(|_| DomainError::Validation {
            field,
            message: format!("{raw:?} is not a date"),
        })
}

impl LogQuery {
    fn filter(&self) -> AppResult<ActivityFilter> {
        // actionType wins over action
        let actions = match (&self.action_type, &self.action) {
            (Some(kind), _) => match ActionKind::parse(kind) {
                Some(kind) => kind.actions(),
                None => vec![parse_action(kind)?],
            },
            (None, Some(action)) => vec![parse_action(action)?],
            (None, None) => Vec::new(),
        };

        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);

        Ok(ActivityFilter {
            user_id: self.user_id.clone(),
            actions,
            chest_id: self.chest_id.as_deref().map(parse_chest_id).transpose()?,
            since: self
                .start_date
                .as_deref()
                .map(|raw| parse_bound("startDate", raw, NaiveTime::MIN))
                .transpose()?,
            until: self
                .end_date
                .as_deref()
                .map(|raw| parse_bound("endDate", raw, end_of_day))
                .transpose()?,
        })
    }
}

async fn list(
    State(ctx): State<HttpAppCtx>,
    _caller: Authorized,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> AppResult<Json<LogPage>> {
    let filter = query.filter()?;
    let page = Pagination::new(query.page, query.limit);
    Ok(Json(ctx.registry.services.activity.list(&filter, page).await?))
}

async fn stats(State(ctx): State<HttpAppCtx>, _caller: Authorized) -> AppResult<Json<ActivityStats>> {
    Ok(Json(ctx.registry.services.activity.stats().await?))
}

async fn users(State(ctx): State<HttpAppCtx>, _caller: Authorized) -> AppResult<Json<Vec<UserActivity>>> {
    Ok(Json(ctx.registry.services.activity.users().await?))
}

async fn create(
    State(ctx): State<HttpAppCtx>,
    caller: Authorized,
    JsonBody(body): JsonBody<NewLogBody>,
) -> AppResult<(StatusCode, Json<ActivityLog>)> {
    let log = body.into_log(&caller.0.id, &caller.0.username)?;
    let log = ctx.registry.services.activity.append(log).await?;
    Ok((StatusCode::CREATED, Json(log)))
}
