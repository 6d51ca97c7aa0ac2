use discord_bot::cogs;
use discord_bot::commands::admin;
use discord_bot::config::Config;
use discord_bot::db::Database;
use discord_bot::extensions::Extensions;
use discord_bot::handlers;
use discord_bot::host::{self, Lifecycle};
use discord_bot::sync::{active_application_commands, CommandTree, HttpPublisher, SyncRequest, SyncSpec};
use discord_bot::Data;
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("discord_bot=info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let lifecycle = Arc::new(Lifecycle::new());
    lifecycle.start();

    let db = Arc::new(Database::new(config.database.clone()));
    if let Err(e) = init_store(&db).await {
        error!(error = %e, "Failed to initialize database");
        std::process::exit(1);
    }

    let catalog = cogs::catalog();
    let extensions = Arc::new(Extensions::new(catalog.clone()));
    match extensions.load_all() {
        Ok(count) => info!(count, "Extensions loaded"),
        Err(e) => {
            error!(error = %e, "Failed to load extensions");
            db.disconnect().await;
            std::process::exit(1);
        }
    }

    if config.owner_ids.is_empty() {
        info!("No OWNER_IDS configured, admin commands are limited to the application owner");
    }

    let mut commands = admin::commands();
    commands.extend(cogs::command_definitions(&catalog));

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let token = config.discord_token.clone();
    let client_id = config.client_id;
    let owners: HashSet<serenity::UserId> = config.owner_ids.iter().copied().collect();
    let prefix = config.prefix.clone();

    let setup_db = Arc::clone(&db);
    let setup_extensions = Arc::clone(&extensions);
    let setup_lifecycle = Arc::clone(&lifecycle);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            owners,
            initialize_owners: true,
            command_check: Some(|ctx| Box::pin(handlers::command_check(ctx))),
            pre_command: |ctx| Box::pin(handlers::pre_command(ctx)),
            post_command: |ctx| Box::pin(handlers::post_command(ctx)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::on_event(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(handlers::on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!(bot = %ready.user.name, guilds = ready.guilds.len(), "Connected to gateway");

                let data = Data {
                    db: setup_db,
                    config,
                    extensions: setup_extensions,
                    lifecycle: setup_lifecycle,
                    tree: CommandTree::default(),
                    start_time: std::time::Instant::now(),
                };

                // Development guild gets a copy of the active commands right away
                if let Some(guild_id) = data.config.guild_id {
                    let global = active_application_commands(
                        &framework.options().commands,
                        &data.extensions,
                        admin::is_host_command,
                    );
                    let request = SyncRequest {
                        guilds: Vec::new(),
                        spec: SyncSpec::CopyGlobal,
                    };
                    let publisher = HttpPublisher::new(ctx.http.clone());
                    match data.tree.sync(&publisher, global, guild_id, request).await {
                        Ok(outcome) => info!(guild_id = %guild_id, outcome = %outcome, "Development guild synced"),
                        Err(e) => warn!(guild_id = %guild_id, error = %e, "Failed to sync development guild"),
                    }
                }

                Ok(data)
            })
        })
        .build();

    let mut builder = serenity::ClientBuilder::new(&token, intents).framework(framework);
    if let Some(client_id) = client_id {
        builder = builder.application_id(client_id);
    }
    let mut client = match builder.await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to create Discord client");
            db.disconnect().await;
            std::process::exit(1);
        }
    };

    // Graceful shutdown on SIGINT/SIGTERM
    let shard_manager = client.shard_manager.clone();
    let signal_db = Arc::clone(&db);
    let signal_lifecycle = Arc::clone(&lifecycle);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping bot...");
        host::shutdown(&signal_lifecycle, &signal_db, shard_manager.shutdown_all()).await;
    });

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!(error = %why, "Client error");
    }

    host::shutdown(&lifecycle, &db, client.shard_manager.shutdown_all()).await;
    info!("Bot has shut down cleanly");
}

/// Open the pool and make sure the schema exists.
async fn init_store(db: &Database) -> Result<(), discord_bot::error::Error> {
    db.connect().await?;
    db.ensure_schema().await?;
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
