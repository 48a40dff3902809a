use anyhow::Context;
use chestkeeper::services::auth::DiscordRoleProvider;
use chestkeeper::{Registry, Repos, config, db, net::http};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    // a TOML file replaces the environment entirely
    let cfg = match std::env::var("CHESTKEEPER_CONFIG") {
        Ok(path) => config::Config::load(path)?,
        Err(_) => config::Config::from_env()?,
    };
    let cfg = Arc::new(cfg);

    let repos = match cfg.database_url.as_deref() {
        Some(url) => {
            let db = Arc::new(db::Db::new(url)?);
            db.init().await.context("running migrations")?;
            Repos::postgres(db)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, chests and items live in memory only");
            Repos::in_memory()
        }
    };

    if cfg.discord_required_role_id.is_empty() {
        tracing::warn!("DISCORD_REQUIRED_ROLE_ID not set, guild membership is enough for chest routes");
    }
    let provider = Arc::new(DiscordRoleProvider::new(
        &cfg.discord_api_base,
        &cfg.discord_guild_id,
        &cfg.discord_bot_token,
    )?);

    let registry = Arc::new(Registry::new(cfg.clone(), repos, provider));
    spawn_background_tasks(registry.clone());

    let addr: SocketAddr = cfg.http_addr.parse().context("parsing HTTP_ADDR")?;
    tracing::info!(%addr, "chestkeeper http listening");
    http::serve(addr, registry).await?;

    Ok(())
}

/// Drops idle sessions and role cache entries too old to serve even as a fallback.
fn spawn_background_tasks(registry: Arc<Registry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            let now = chrono::Utc::now();
            let auth = &registry.services.auth;

            let evicted = auth.role_cache().expire(now);
            if evicted > 0 {
                tracing::debug!(evicted, "role cache swept");
            }
            let closed = auth.sessions().expire(now);
            if closed > 0 {
                tracing::info!(closed, remaining = auth.sessions().len(), "idle sessions expired");
            }
        }
    });
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, prelude::*};

    color_eyre::install().map_err(|e| anyhow::anyhow!("installing error hooks: {e}"))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,chestkeeper=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::uptime()),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    Ok(())
}
