use crate::config::Config;
use crate::db::Db;
use crate::db::repo::{ActivityRepo, ActivityRepository, MemoryActivityRepository};
use crate::db::repo::{ChestRepo, ChestRepository, MemoryChestRepository};
use crate::db::repo::{ItemRepo, ItemRepository, MemoryItemRepository};
use crate::services::auth::{AuthSettings, RoleProvider};
use crate::services::{ActivityService, AuthService, CatalogService, ChestService};
use std::sync::Arc;
use std::time::Duration;

pub struct Repos {
    pub item: Arc<dyn ItemRepo>,
    pub chest: Arc<dyn ChestRepo>,
    pub activity: Arc<dyn ActivityRepo>,
}

impl Repos {
    pub fn postgres(db: Arc<Db>) -> Self {
        Self {
            item: Arc::new(ItemRepository::new(db.clone())),
            chest: Arc::new(ChestRepository::new(db.clone())),
            activity: Arc::new(ActivityRepository::new(db)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            item: Arc::new(MemoryItemRepository::new()),
            chest: Arc::new(MemoryChestRepository::new()),
            activity: Arc::new(MemoryActivityRepository::new()),
        }
    }
}

pub struct Services {
    pub catalog: Arc<CatalogService>,
    pub chest: Arc<ChestService>,
    pub activity: Arc<ActivityService>,
    pub auth: Arc<AuthService>,
}

pub struct Registry {
    pub repos: Arc<Repos>,
    pub services: Arc<Services>,
    pub config: Arc<Config>,
}

impl Registry {
    pub fn new(config: Arc<Config>, repos: Repos, provider: Arc<dyn RoleProvider>) -> Self {
        let repos = Arc::new(repos);

        let activity = Arc::new(ActivityService::new(repos.activity.clone()));
        let catalog = Arc::new(CatalogService::new(repos.item.clone()));
        let chest = Arc::new(ChestService::new(repos.chest.clone(), catalog.clone(), activity.clone()));

        let settings = AuthSettings {
            required_role: config.discord_required_role_id.clone(),
            bot_secret: config.bot_shared_secret.clone(),
            role_ttl: chrono::Duration::seconds(config.role_cache_ttl_secs as i64),
            role_stale: chrono::Duration::seconds(config.role_cache_stale_secs as i64),
            session_ttl: chrono::Duration::seconds(config.session_ttl_secs as i64),
            provider_timeout: Duration::from_secs(5),
        };
        let auth = Arc::new(AuthService::new(settings, provider, activity.clone()));

        let services = Arc::new(Services {
            catalog,
            chest,
            activity,
            auth,
        });

        Self {
            repos,
            services,
            config,
        }
    }
}
