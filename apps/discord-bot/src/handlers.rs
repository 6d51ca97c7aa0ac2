//! Framework hooks: event dispatch, command gating and error replies.

use crate::cogs::EventKind;
use crate::commands::admin;
use crate::error::Error;
use crate::{Context, Data};
use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const PERMISSION_DENIED: &str = "You don't have the required permissions.";
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred.";
pub const COMMAND_UNAVAILABLE: &str = "That command is not available right now.";

/// How a command was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStyle {
    Prefix,
    Slash,
}

impl CommandStyle {
    pub fn of(ctx: &Context<'_>) -> Self {
        match ctx {
            poise::Context::Prefix(_) => CommandStyle::Prefix,
            poise::Context::Application(_) => CommandStyle::Slash,
        }
    }
}

/// A command failure as the invoking user sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The command is unknown or its cog is not loaded.
    NotFound,
    Denied,
    Cooldown(Duration),
    Unexpected(String),
}

/// The single message sent back for a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
}

impl Failure {
    fn classify(error: &poise::FrameworkError<'_, Data, Error>) -> Option<Self> {
        use poise::FrameworkError as F;

        match error {
            F::Command { error, .. } => Some(Failure::Unexpected(error.to_string())),
            F::CommandPanic { payload, .. } => Some(Failure::Unexpected(
                payload.clone().unwrap_or_else(|| "command panicked".into()),
            )),
            F::MissingUserPermissions { .. } | F::NotAnOwner { .. } => Some(Failure::Denied),
            F::CooldownHit {
                remaining_cooldown, ..
            } => Some(Failure::Cooldown(*remaining_cooldown)),
            F::CommandCheckFailed {
                error: Some(Error::CommandInactive(_)),
                ..
            } => Some(Failure::NotFound),
            F::CommandCheckFailed {
                error: Some(error), ..
            } => Some(Failure::Unexpected(error.to_string())),
            F::CommandCheckFailed { error: None, .. } => Some(Failure::Denied),
            _ => None,
        }
    }

    /// Text command failures reply in channel; slash failures reply
    /// ephemerally. Unknown text commands are ignored.
    pub fn reply(&self, style: CommandStyle) -> Option<Reply> {
        let content = match (self, style) {
            (Failure::NotFound, CommandStyle::Prefix) => return None,
            (Failure::NotFound, CommandStyle::Slash) => COMMAND_UNAVAILABLE.to_string(),
            (Failure::Denied, _) => PERMISSION_DENIED.to_string(),
            (Failure::Cooldown(left), CommandStyle::Prefix) => format!(
                "This command is on cooldown. Try again in {:.2} seconds.",
                left.as_secs_f64()
            ),
            (Failure::Cooldown(left), CommandStyle::Slash) => {
                format!("Cooldown! Try again in {:.2} seconds.", left.as_secs_f64())
            }
            (Failure::Unexpected(_), _) => UNEXPECTED_ERROR.to_string(),
        };
        Some(Reply {
            content,
            ephemeral: style == CommandStyle::Slash,
        })
    }
}

/// Top-level error handler for both command styles. Errors are answered and
/// logged here, never re-raised.
pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!(error = %error, "Framework setup failed");
        }
        poise::FrameworkError::EventHandler { error, event, .. } => {
            error!(event = event.snake_case_name(), error = %error, "Event handler failed");
        }
        poise::FrameworkError::UnknownCommand { .. } => {}
        other => match (Failure::classify(&other), other.ctx()) {
            (Some(failure), Some(ctx)) => respond(ctx, failure).await,
            _ => {
                if let Err(e) = poise::builtins::on_error(other).await {
                    error!(error = %e, "Error handling error");
                }
            }
        },
    }
}

async fn respond(ctx: Context<'_>, failure: Failure) {
    let style = CommandStyle::of(&ctx);

    if let Failure::Unexpected(detail) = &failure {
        ctx.data().lifecycle.degrade();
        error!(
            command = %ctx.command().qualified_name,
            style = ?style,
            error = %detail,
            "Command error"
        );
    } else {
        debug!(command = %ctx.command().qualified_name, failure = ?failure, "Command refused");
    }

    let Some(reply) = failure.reply(style) else {
        return;
    };
    let builder = poise::CreateReply::default()
        .content(reply.content)
        .ephemeral(reply.ephemeral);
    if let Err(e) = ctx.send(builder).await {
        warn!(error = %e, "Failed to send error reply");
    }
}

/// Gateway events: readiness bookkeeping, then fan-out to cog listeners.
pub async fn on_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    let kind = EventKind::of(event);
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            if data.lifecycle.mark_ready() {
                info!(bot = %data_about_bot.user.name, "Bot is ready!");
            } else {
                info!(bot = %data_about_bot.user.name, "Gateway session re-established");
            }
        }
        serenity::FullEvent::Resume { .. } => info!("Gateway session resumed"),
        _ => {}
    }

    for (extension, listener) in data.extensions.listeners_for(kind) {
        if let Err(e) = listener.handle(ctx, event, data).await {
            error!(
                extension = %extension,
                event = event.snake_case_name(),
                error = %e,
                "Listener failed"
            );
        }
    }
    Ok(())
}

/// Only host commands and commands of loaded cogs may run.
pub async fn command_check(ctx: Context<'_>) -> Result<bool, Error> {
    let command = ctx.command();
    if admin::is_host_command(command) || ctx.data().extensions.is_command_active(&command.name) {
        Ok(true)
    } else {
        Err(Error::CommandInactive(command.name.clone()))
    }
}

/// Records the invoking user before every command body.
pub async fn pre_command(ctx: Context<'_>) {
    let author = ctx.author();
    debug!(command = %ctx.command().qualified_name, user = %author.name, "Command invoked");
    if let Err(e) = ctx.data().db.upsert_user(author.id.get(), &author.name).await {
        warn!(user_id = %author.id, error = %e, "Failed to record user");
    }
}

pub async fn post_command(ctx: Context<'_>) {
    ctx.data().lifecycle.recover();
}
