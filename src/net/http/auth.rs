use super::HttpAppCtx;
use super::extract::{Authenticated, JsonBody};
use crate::error::AppResult;
use crate::models::caller::SessionUser;
use crate::util::serde_helpers::non_blank;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const BOT_SECRET_HEADER: &str = "x-bot-secret";

pub(super) fn routes() -> Router<HttpAppCtx> {
    Router::new()
        .route("/auth/bot", post(bot_login))
        .route("/auth/bot/auth", post(bot_login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BotLoginBody {
    #[serde(default, with = "non_blank")]
    discord_user_id: Option<String>,
    #[serde(default, with = "non_blank")]
    username: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BotLoginResponse {
    success: bool,
    user: SessionUser,
    session_token: String,
}

async fn bot_login(
    State(ctx): State<HttpAppCtx>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<BotLoginBody>,
) -> AppResult<Json<BotLoginResponse>> {
    let secret = headers.get(BOT_SECRET_HEADER).and_then(|v| v.to_str().ok());

    let (session_token, user) = ctx
        .registry
        .services
        .auth
        .login_bot(
            body.discord_user_id.as_deref().unwrap_or_default(),
            body.username.as_deref().unwrap_or_default(),
            secret,
        )
        .await?;

    Ok(Json(BotLoginResponse {
        success: true,
        user,
        session_token,
    }))
}

async fn logout(State(ctx): State<HttpAppCtx>, session: Authenticated) -> AppResult<Json<Value>> {
    ctx.registry.services.auth.logout(&session.token).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn me(session: Authenticated) -> Json<SessionUser> {
    Json(session.user)
}
