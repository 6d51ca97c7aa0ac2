//! Owner-only commands that manage the host itself.

use crate::cogs;
use crate::error::ExtensionError;
use crate::sync::{active_application_commands, HttpPublisher, SyncRequest};
use crate::utils::constants::Emoji;
use crate::utils::embeds;
use crate::{host, Command, Context};
use tracing::{info, warn};

type Error = crate::error::Error;

/// Category marking commands owned by the host rather than a cog.
pub const CATEGORY: &str = "Admin";

pub fn commands() -> Vec<Command> {
    vec![load(), unload(), reload(), sync(), extensions(), shutdown()]
}

pub fn is_host_command(command: &Command) -> bool {
    command.category.as_deref() == Some(CATEGORY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Load,
    Unload,
    Reload,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::Load => "load",
            Action::Unload => "unload",
            Action::Reload => "reload",
        }
    }

    fn past(self) -> &'static str {
        match self {
            Action::Load => "Loaded",
            Action::Unload => "Unloaded",
            Action::Reload => "Reloaded",
        }
    }
}

fn report(action: Action, cog: &str, result: &Result<(), ExtensionError>) -> String {
    match result {
        Ok(()) => format!("{} {} `{cog}` successfully.", Emoji::CHECKMARK, action.past()),
        Err(e) => format!("{} Failed to {} `{cog}`: {e}", Emoji::CROSS, action.verb()),
    }
}

async fn manage(ctx: Context<'_>, action: Action, cog: String) -> Result<(), Error> {
    let name = cogs::qualify(&cog);
    let extensions = &ctx.data().extensions;
    let result = match action {
        Action::Load => extensions.load(&name),
        Action::Unload => extensions.unload(&name),
        Action::Reload => extensions.reload(&name),
    };

    match &result {
        Ok(()) => info!(extension = %name, user = %ctx.author().name, action = action.verb(), "Extension change applied"),
        Err(e) => warn!(extension = %name, action = action.verb(), error = %e, "Extension change failed"),
    }

    ctx.say(report(action, &cog, &result)).await?;
    Ok(())
}

async fn autocomplete_cog(ctx: Context<'_>, partial: &str) -> Vec<String> {
    ctx.data()
        .extensions
        .available()
        .into_iter()
        .filter_map(|name| name.strip_prefix("cogs."))
        .filter(|name| name.starts_with(partial))
        .map(str::to_string)
        .collect()
}

/// Load a cog
#[poise::command(slash_command, prefix_command, owners_only, category = "Admin")]
pub async fn load(
    ctx: Context<'_>,
    #[description = "Cog to load"]
    #[autocomplete = "autocomplete_cog"]
    cog: String,
) -> Result<(), Error> {
    manage(ctx, Action::Load, cog).await
}

/// Unload a cog
#[poise::command(slash_command, prefix_command, owners_only, category = "Admin")]
pub async fn unload(
    ctx: Context<'_>,
    #[description = "Cog to unload"]
    #[autocomplete = "autocomplete_cog"]
    cog: String,
) -> Result<(), Error> {
    manage(ctx, Action::Unload, cog).await
}

/// Reload a cog
#[poise::command(slash_command, prefix_command, owners_only, category = "Admin")]
pub async fn reload(
    ctx: Context<'_>,
    #[description = "Cog to reload"]
    #[autocomplete = "autocomplete_cog"]
    cog: String,
) -> Result<(), Error> {
    manage(ctx, Action::Reload, cog).await
}

/// Sync application commands: `sync [guild ids…] [~|*|^]`
#[poise::command(prefix_command, owners_only, guild_only, category = "Admin")]
pub async fn sync(ctx: Context<'_>, #[rest] args: Option<String>) -> Result<(), Error> {
    let request = match SyncRequest::parse(args.as_deref().unwrap_or_default()) {
        Ok(request) => request,
        Err(msg) => {
            ctx.say(format!("{} {msg}", Emoji::CROSS)).await?;
            return Ok(());
        }
    };
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let global = active_application_commands(
        &ctx.framework().options().commands,
        &ctx.data().extensions,
        is_host_command,
    );
    let publisher = HttpPublisher::new(ctx.serenity_context().http.clone());
    let outcome = ctx
        .data()
        .tree
        .sync(&publisher, global, guild_id, request)
        .await?;

    info!(guild_id = %guild_id, outcome = %outcome, "Command tree synced");
    ctx.say(outcome.to_string()).await?;
    Ok(())
}

/// List loaded and available cogs
#[poise::command(slash_command, prefix_command, owners_only, category = "Admin")]
pub async fn extensions(ctx: Context<'_>) -> Result<(), Error> {
    let extensions = &ctx.data().extensions;
    let loaded = extensions.loaded_names();
    let unloaded: Vec<&str> = extensions
        .available()
        .into_iter()
        .filter(|name| !loaded.iter().any(|l| l.as_str() == *name))
        .collect();

    let uptime = ctx.data().start_time.elapsed().as_secs();
    let embed = embeds::info_embed()
        .title("Extensions")
        .field("Version", &ctx.data().config.bot_version, true)
        .field(
            "Uptime",
            format!("{}h {}m {}s", uptime / 3600, (uptime % 3600) / 60, uptime % 60),
            true,
        )
        .field("Loaded", bullet_list(loaded.iter().map(String::as_str)), false)
        .field("Not loaded", bullet_list(unloaded.into_iter()), false)
        .field(
            "Active commands",
            bullet_list(extensions.active_commands().iter().map(String::as_str)),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Shut the bot down
#[poise::command(slash_command, prefix_command, owners_only, category = "Admin")]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    let embed = embeds::caution_embed()
        .title("Shutting down")
        .description("Closing the database and gateway.");
    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    info!(user = %ctx.author().name, "Shutdown requested");
    let data = ctx.data();
    let shard_manager = ctx.framework().shard_manager();
    host::shutdown(&data.lifecycle, &data.db, shard_manager.shutdown_all()).await;
    Ok(())
}

fn bullet_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<String> = items.map(|item| format!("\u{2022} `{item}`")).collect();
    if lines.is_empty() {
        "*none*".to_string()
    } else {
        lines.join("\n")
    }
}
