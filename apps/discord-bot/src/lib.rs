pub mod cogs;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod extensions;
pub mod handlers;
pub mod host;
pub mod sync;
pub mod utils;

use std::sync::Arc;

/// Shared data accessible across all Poise commands and event handlers.
pub struct Data {
    pub db: Arc<db::Database>,
    pub config: config::Config,
    pub extensions: Arc<extensions::Extensions>,
    pub lifecycle: Arc<host::Lifecycle>,
    pub tree: sync::CommandTree,
    pub start_time: std::time::Instant,
}

/// Poise context alias used throughout the bot.
pub type Context<'a> = poise::Context<'a, Data, error::Error>;

/// Poise command alias used by cogs and the host.
pub type Command = poise::Command<Data, error::Error>;
