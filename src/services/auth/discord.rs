use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    pub roles: Vec<String>,
    pub username: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Member or guild unknown to the provider (HTTP 404)
    #[error("member not found")]
    NotFound,

    /// Guild id or bot token missing from the configuration
    #[error("role provider is not configured")]
    NotConfigured,

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("provider request failed: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Whether the failure means the provider setup is incomplete, rather than unavailable.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(self, ProviderError::NotFound | ProviderError::NotConfigured)
    }
}

/// Source of truth for the roles a user holds.
#[async_trait::async_trait]
pub trait RoleProvider: Send + Sync {
    async fn member(&self, user_id: &str) -> Result<GuildMember, ProviderError>;
}

#[derive(Deserialize)]
struct MemberUser {
    username: Option<String>,
}

#[derive(Deserialize)]
struct MemberResponse {
    #[serde(default)]
    roles: Vec<String>,
    user: Option<MemberUser>,
    nick: Option<String>,
}

/// Looks members up through the Discord bot API.
pub struct DiscordRoleProvider {
    client: reqwest::Client,
    api_base: String,
    guild_id: String,
    bot_token: String,
}

impl DiscordRoleProvider {
    pub fn new(api_base: &str, guild_id: &str, bot_token: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            guild_id: guild_id.to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    fn member_url(&self, user_id: &str) -> String {
        format!("{}/guilds/{}/members/{}", self.api_base, self.guild_id, user_id)
    }
}

#[async_trait::async_trait]
impl RoleProvider for DiscordRoleProvider {
    async fn member(&self, user_id: &str) -> Result<GuildMember, ProviderError> {
        if self.guild_id.is_empty() || self.bot_token.is_empty() {
            return Err(ProviderError::NotConfigured);
        }

        let resp = self
            .client
            .get(self.member_url(user_id))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(ProviderError::NotFound);
        }
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let member: MemberResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(GuildMember {
            roles: member.roles,
            username: member.user.and_then(|u| u.username).or(member.nick),
        })
    }
}
