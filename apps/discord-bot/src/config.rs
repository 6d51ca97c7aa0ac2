use crate::error::Error;
use serenity::all::{ApplicationId, GuildId, UserId};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:database.db";
pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_POOL_SIZE: u32 = 5;
pub const DEFAULT_MAX_OVERFLOW: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub client_id: Option<ApplicationId>,
    pub database: DatabaseConfig,
    pub prefix: String,
    pub owner_ids: Vec<UserId>,
    pub guild_id: Option<GuildId>,
    pub bot_version: String,
}

/// Connection settings for the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub max_overflow: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: DEFAULT_POOL_SIZE,
            max_overflow: DEFAULT_MAX_OVERFLOW,
        }
    }

    /// Upper bound on simultaneously open connections.
    pub fn max_connections(&self) -> u32 {
        (self.pool_size + self.max_overflow).max(1)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DISCORD_TOKEN` — Bot token from Discord Developer Portal
    ///
    /// Optional:
    /// - `DISCORD_CLIENT_ID` — Application ID
    /// - `DATABASE_URL` — SQLite connection string (default "sqlite:database.db")
    /// - `COMMAND_PREFIX` — Prefix for text commands (default "!")
    /// - `OWNER_IDS` — Comma-separated user IDs allowed to run admin commands
    /// - `GUILD_ID` — Development guild that receives a command copy on startup
    /// - `DB_POOL_SIZE` / `DB_MAX_OVERFLOW` — Connection pool sizing
    pub fn from_env() -> Result<Self, Error> {
        let discord_token = std::env::var("DISCORD_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config("DISCORD_TOKEN environment variable is required".into()))?;

        let client_id = parse_optional_id::<ApplicationId>("DISCORD_CLIENT_ID")?;

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
            pool_size: parse_u32_or("DB_POOL_SIZE", DEFAULT_POOL_SIZE)?,
            max_overflow: parse_u32_or("DB_MAX_OVERFLOW", DEFAULT_MAX_OVERFLOW)?,
        };

        let prefix = match std::env::var("COMMAND_PREFIX") {
            Ok(p) if !p.trim().is_empty() => p.trim().to_string(),
            _ => DEFAULT_PREFIX.to_string(),
        };

        let owner_ids = parse_id_list::<UserId>("OWNER_IDS")?;
        let guild_id = parse_optional_id::<GuildId>("GUILD_ID")?;

        Ok(Self {
            discord_token,
            client_id,
            database,
            prefix,
            owner_ids,
            guild_id,
            bot_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

fn parse_id_list<T>(var: &str) -> Result<Vec<T>, Error>
where
    T: From<u64>,
{
    match std::env::var(var) {
        Ok(val) if !val.is_empty() => split_ids(var, &val),
        _ => Ok(Vec::new()),
    }
}

fn split_ids<T>(var: &str, val: &str) -> Result<Vec<T>, Error>
where
    T: From<u64>,
{
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .ok()
                .filter(|id| *id != 0)
                .map(T::from)
                .ok_or_else(|| Error::Config(format!("Invalid ID in {var}: '{s}'")))
        })
        .collect()
}

fn parse_optional_id<T>(var: &str) -> Result<Option<T>, Error>
where
    T: From<u64>,
{
    match std::env::var(var) {
        Ok(val) if !val.is_empty() => {
            let id = val
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|id| *id != 0)
                .ok_or_else(|| Error::Config(format!("Invalid ID for {var}: '{val}'")))?;
            Ok(Some(T::from(id)))
        }
        _ => Ok(None),
    }
}

fn parse_u32_or(var: &str, default: u32) -> Result<u32, Error> {
    match std::env::var(var) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::Config(format!("Invalid number for {var}: '{val}'"))),
        _ => Ok(default),
    }
}
