mod cache;
mod discord;

pub use cache::{Freshness, RoleCache};
pub use discord::{DiscordRoleProvider, GuildMember, ProviderError, RoleProvider};

use crate::error::{AppResult, DomainError};
use crate::models::caller::{Caller, RoleGrant, SessionUser};
use crate::services::activity::{ActivityService, Actor};
use crate::state::session::SessionStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub struct AuthSettings {
    /// Role needed for chest and log routes. Empty means guild membership is enough.
    pub required_role: String,
    /// When set, bot logins must present this secret
    pub bot_secret: Option<String>,
    pub role_ttl: chrono::Duration,
    pub role_stale: chrono::Duration,
    /// Idle lifetime of a bot session
    pub session_ttl: chrono::Duration,
    pub provider_timeout: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            required_role: String::new(),
            bot_secret: None,
            role_ttl: chrono::Duration::hours(1),
            role_stale: chrono::Duration::hours(24),
            session_ttl: chrono::Duration::hours(24),
            provider_timeout: Duration::from_secs(5),
        }
    }
}

pub struct AuthService {
    sessions: SessionStore,
    roles: RoleCache,
    provider: Arc<dyn RoleProvider>,
    activity: Arc<ActivityService>,
    required_role: String,
    bot_secret: Option<String>,
    provider_timeout: Duration,
}

impl AuthService {
    pub fn new(settings: AuthSettings, provider: Arc<dyn RoleProvider>, activity: Arc<ActivityService>) -> Self {
        Self {
            sessions: SessionStore::new(settings.session_ttl),
            roles: RoleCache::new(settings.role_ttl, settings.role_stale),
            provider,
            activity,
            required_role: settings.required_role,
            bot_secret: settings.bot_secret,
            provider_timeout: settings.provider_timeout,
        }
    }

    pub fn role_cache(&self) -> &RoleCache {
        &self.roles
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Opens a bearer session for a Discord bot acting on behalf of `user_id`.
    pub async fn login_bot(
        &self,
        user_id: &str,
        username: &str,
        presented_secret: Option<&str>,
    ) -> AppResult<(String, SessionUser)> {
        if let Some(expected) = &self.bot_secret
            && presented_secret != Some(expected.as_str())
        {
            tracing::warn!(user_id, "bot login with a bad shared secret");
            return Err(DomainError::PermissionDenied("invalid bot secret".into()));
        }

        let (user_id, username) = (user_id.trim(), username.trim());
        if user_id.is_empty() || username.is_empty() {
            return Err(DomainError::InvalidInput("discordUserId and username are required".into()));
        }

        let user = SessionUser::bot(user_id, username);
        let token = self.sessions.open(user.clone(), Utc::now());

        tracing::info!(user_id, username, "bot session opened");
        self.activity
            .login(Actor {
                id: user_id,
                username,
            })
            .await;

        Ok((token, user))
    }

    pub fn authenticate(&self, token: &str) -> AppResult<SessionUser> {
        self.sessions.get(token, Utc::now()).ok_or(DomainError::NotLoggedIn)
    }

    pub async fn logout(&self, token: &str) -> AppResult<SessionUser> {
        let user = self.sessions.close(token).ok_or(DomainError::NotLoggedIn)?;
        self.roles.invalidate(&user.id);

        self.activity
            .logout(Actor {
                id: &user.id,
                username: &user.username,
            })
            .await;
        Ok(user)
    }

    // ========================================================================
    // ROLE CHECK
    // ========================================================================

    /// Checks the required role, asking the provider only when the cached snapshot is older than the TTL.
    pub async fn authorize(&self, user: &SessionUser) -> AppResult<Caller> {
        let now = Utc::now();
        let cached = self.roles.get(&user.id, now);

        let grant = match cached {
            Some((grant, Freshness::Fresh)) => grant,
            stale => match self.fetch_roles(user).await {
                Ok(grant) => {
                    self.roles.put(&user.id, grant.clone());
                    grant
                }
                Err(e) => match stale {
                    Some((grant, _)) => {
                        tracing::warn!(user_id = %user.id, error = %e, "role provider failed, using cached roles");
                        grant
                    }
                    None if e.is_misconfiguration() => {
                        tracing::warn!(
                            user_id = %user.id,
                            error = %e,
                            "role provider setup incomplete, granting access temporarily"
                        );
                        let grant = RoleGrant {
                            roles: Vec::new(),
                            has_required_role: true,
                            username: user.username.clone(),
                            checked_at: Utc::now(),
                        };
                        self.roles.put(&user.id, grant.clone());
                        grant
                    }
                    None => {
                        tracing::error!(user_id = %user.id, error = %e, "role check failed");
                        return Err(DomainError::PermissionDenied("cannot verify roles".into()));
                    }
                },
            },
        };

        if !grant.has_required_role {
            return Err(DomainError::PermissionDenied("required role missing".into()));
        }

        Ok(Caller {
            id: user.id.clone(),
            username: grant.username,
            roles: grant.roles,
            last_role_check: grant.checked_at,
        })
    }

    async fn fetch_roles(&self, user: &SessionUser) -> Result<RoleGrant, ProviderError> {
        let member = tokio::time::timeout(self.provider_timeout, self.provider.member(&user.id))
            .await
            .map_err(|_| ProviderError::Transport("role lookup timed out".into()))??;

        let has_required_role = self.required_role.is_empty() || member.roles.iter().any(|r| *r == self.required_role);

        Ok(RoleGrant {
            has_required_role,
            username: member.username.unwrap_or_else(|| user.username.clone()),
            roles: member.roles,
            checked_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::MemoryActivityRepository;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider answering from a script, counting calls
    struct ScriptedProvider {
        answer: Mutex<Result<GuildMember, ProviderError>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(answer: Result<GuildMember, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(answer),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, answer: Result<GuildMember, ProviderError>) {
            *self.answer.lock() = answer;
        }
    }

    fn clone_answer(a: &Result<GuildMember, ProviderError>) -> Result<GuildMember, ProviderError> {
        match a {
            Ok(m) => Ok(m.clone()),
            Err(ProviderError::NotFound) => Err(ProviderError::NotFound),
            Err(ProviderError::NotConfigured) => Err(ProviderError::NotConfigured),
            Err(ProviderError::Status(s)) => Err(ProviderError::Status(*s)),
            Err(ProviderError::Transport(s)) => Err(ProviderError::Transport(s.clone())),
        }
    }

    #[async_trait::async_trait]
    impl RoleProvider for ScriptedProvider {
        async fn member(&self, _user_id: &str) -> Result<GuildMember, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            clone_answer(&self.answer.lock())
        }
    }

    fn member(roles: &[&str]) -> Result<GuildMember, ProviderError> {
        Ok(GuildMember {
            roles: roles.iter().map(|r| r.to_string()).collect(),
            username: Some("Paul".into()),
        })
    }

    fn service(provider: Arc<ScriptedProvider>) -> AuthService {
        let settings = AuthSettings {
            required_role: "keeper".into(),
            ..Default::default()
        };
        let activity = Arc::new(ActivityService::new(Arc::new(MemoryActivityRepository::new())));
        AuthService::new(settings, provider, activity)
    }

    fn stale_grant(has_required_role: bool) -> RoleGrant {
        RoleGrant {
            roles: vec!["keeper".into()],
            has_required_role,
            username: "Paul".into(),
            checked_at: Utc::now() - chrono::Duration::hours(2),
        }
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_provider() {
        let provider = ScriptedProvider::new(member(&["keeper"]));
        let auth = service(provider.clone());
        let user = SessionUser::bot("u1", "paul");

        let caller = auth.authorize(&user).await.unwrap();
        assert_eq!(caller.username, "Paul");
        auth.authorize(&user).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_role_is_forbidden() {
        let auth = service(ScriptedProvider::new(member(&["visitor"])));
        let err = auth.authorize(&SessionUser::bot("u1", "paul")).await.unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_stale_cache() {
        let provider = ScriptedProvider::new(Err(ProviderError::Status(503)));
        let auth = service(provider.clone());
        let user = SessionUser::bot("u1", "paul");

        // nothing cached: denied
        assert!(matches!(auth.authorize(&user).await, Err(DomainError::PermissionDenied(_))));

        auth.role_cache().put("u1", stale_grant(true));
        assert!(auth.authorize(&user).await.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        // provider back: stale entry is refreshed with the new answer
        provider.set(member(&[]));
        assert!(auth.authorize(&user).await.is_err());
    }

    #[tokio::test]
    async fn stale_cache_without_role_still_denies() {
        let auth = service(ScriptedProvider::new(Err(ProviderError::Transport("down".into()))));
        auth.role_cache().put("u1", stale_grant(false));
        assert!(auth.authorize(&SessionUser::bot("u1", "paul")).await.is_err());
    }

    #[tokio::test]
    async fn unknown_member_degrades_to_permissive_access() {
        let provider = ScriptedProvider::new(Err(ProviderError::NotFound));
        let auth = service(provider.clone());
        let user = SessionUser::bot("u1", "paul");

        let caller = auth.authorize(&user).await.unwrap();
        assert_eq!(caller.username, "paul");
        assert!(caller.roles.is_empty());

        // the permissive grant is cached like any other
        auth.authorize(&user).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bot_sessions() {
        let auth = service(ScriptedProvider::new(member(&["keeper"])));

        let (token, user) = auth.login_bot("u1", "paul", None).await.unwrap();
        assert_eq!(auth.authenticate(&token).unwrap(), user);

        auth.logout(&token).await.unwrap();
        assert!(matches!(auth.authenticate(&token), Err(DomainError::NotLoggedIn)));
        assert!(matches!(auth.logout(&token).await, Err(DomainError::NotLoggedIn)));

        assert!(matches!(
            auth.login_bot(" ", "paul", None).await,
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let settings = AuthSettings {
            session_ttl: chrono::Duration::seconds(60),
            ..Default::default()
        };
        let activity = Arc::new(ActivityService::new(Arc::new(MemoryActivityRepository::new())));
        let auth = AuthService::new(settings, ScriptedProvider::new(member(&[])), activity);

        let (token, _) = auth.login_bot("u1", "paul", None).await.unwrap();
        assert!(auth.authenticate(&token).is_ok());

        assert_eq!(auth.sessions().expire(Utc::now() + chrono::Duration::seconds(61)), 1);
        assert!(matches!(auth.authenticate(&token), Err(DomainError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn bot_secret_is_enforced_when_configured() {
        let settings = AuthSettings {
            bot_secret: Some("s3cret".into()),
            ..Default::default()
        };
        let activity = Arc::new(ActivityService::new(Arc::new(MemoryActivityRepository::new())));
        let auth = AuthService::new(settings, ScriptedProvider::new(member(&[])), activity);

        assert!(auth.login_bot("u1", "paul", None).await.is_err());
        assert!(auth.login_bot("u1", "paul", Some("nope")).await.is_err());
        assert!(auth.login_bot("u1", "paul", Some("s3cret")).await.is_ok());
    }
}
