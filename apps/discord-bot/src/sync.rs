//! Publishing the active application commands to Discord.

use crate::error::Error;
use crate::extensions::Extensions;
use crate::Command;
use async_trait::async_trait;
use serenity::all::{CreateCommand, GuildId, Http};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// What `sync` does when no explicit guilds are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSpec {
    /// Publish globally.
    Global,
    /// `~`: publish the current guild's own command set.
    Current,
    /// `*`: copy the global set into the current guild, then publish.
    CopyGlobal,
    /// `^`: clear the current guild's set, then publish.
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub guilds: Vec<GuildId>,
    pub spec: SyncSpec,
}

impl SyncRequest {
    /// Parse `[guild ids…] [~|*|^]`.
    pub fn parse(args: &str) -> Result<Self, String> {
        let mut guilds = Vec::new();
        let mut spec = SyncSpec::Global;
        let tokens: Vec<&str> = args.split_whitespace().collect();

        for (i, token) in tokens.iter().enumerate() {
            let flag = match *token {
                "~" => Some(SyncSpec::Current),
                "*" => Some(SyncSpec::CopyGlobal),
                "^" => Some(SyncSpec::Clear),
                _ => None,
            };
            match flag {
                Some(flag) if i + 1 == tokens.len() => spec = flag,
                Some(_) => return Err(format!("`{token}` must be the last argument.")),
                None => match token.parse::<u64>() {
                    Ok(id) if id != 0 => guilds.push(GuildId::new(id)),
                    _ => return Err(format!("`{token}` is not a guild ID or one of `~`, `*`, `^`.")),
                },
            }
        }

        Ok(Self { guilds, spec })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Global(usize),
    CurrentGuild(usize),
    Targets { synced: usize, attempted: usize },
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Global(n) => write!(f, "Synced {n} commands globally."),
            SyncOutcome::CurrentGuild(n) => write!(f, "Synced {n} commands to the current guild."),
            SyncOutcome::Targets { synced, attempted } => {
                write!(f, "Synced the tree to {synced}/{attempted}.")
            }
        }
    }
}

/// Where command sets get published. Returns how many commands the platform accepted.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish_global(&self, commands: Vec<CreateCommand>) -> Result<usize, Error>;

    async fn publish_guild(
        &self,
        guild: GuildId,
        commands: Vec<CreateCommand>,
    ) -> Result<usize, Error>;
}

/// Publishes through the Discord HTTP API.
pub struct HttpPublisher {
    http: Arc<Http>,
}

impl HttpPublisher {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CommandPublisher for HttpPublisher {
    async fn publish_global(&self, commands: Vec<CreateCommand>) -> Result<usize, Error> {
        let published = serenity::all::Command::set_global_commands(&self.http, commands).await?;
        Ok(published.len())
    }

    async fn publish_guild(
        &self,
        guild: GuildId,
        commands: Vec<CreateCommand>,
    ) -> Result<usize, Error> {
        let published = guild.set_commands(&self.http, commands).await?;
        Ok(published.len())
    }
}

/// Guild-scoped command sets. A guild only has commands once the global set
/// has been copied into it.
#[derive(Debug, Default)]
pub struct CommandTree {
    copied: Mutex<HashSet<GuildId>>,
}

impl CommandTree {
    fn guild_commands(&self, guild: GuildId, global: &[CreateCommand]) -> Vec<CreateCommand> {
        let copied = self.copied.lock().unwrap_or_else(|e| e.into_inner());
        if copied.contains(&guild) {
            global.to_vec()
        } else {
            Vec::new()
        }
    }

    fn set_copied(&self, guild: GuildId, copied: bool) {
        let mut set = self.copied.lock().unwrap_or_else(|e| e.into_inner());
        if copied {
            set.insert(guild);
        } else {
            set.remove(&guild);
        }
    }

    /// Carry out a `sync` request.
    ///
    /// With explicit guilds each target is published independently; a
    /// rejected target is logged and counted as not synced.
    pub async fn sync(
        &self,
        publisher: &dyn CommandPublisher,
        global: Vec<CreateCommand>,
        current_guild: GuildId,
        request: SyncRequest,
    ) -> Result<SyncOutcome, Error> {
        if !request.guilds.is_empty() {
            let attempted = request.guilds.len();
            let mut synced = 0;
            for guild in request.guilds {
                let commands = self.guild_commands(guild, &global);
                match publisher.publish_guild(guild, commands).await {
                    Ok(_) => synced += 1,
                    Err(e) => warn!(guild_id = %guild, error = %e, "Guild rejected command sync"),
                }
            }
            return Ok(SyncOutcome::Targets { synced, attempted });
        }

        let outcome = match request.spec {
            SyncSpec::Global => SyncOutcome::Global(publisher.publish_global(global).await?),
            SyncSpec::Current => {
                let commands = self.guild_commands(current_guild, &global);
                SyncOutcome::CurrentGuild(publisher.publish_guild(current_guild, commands).await?)
            }
            SyncSpec::CopyGlobal => {
                self.set_copied(current_guild, true);
                SyncOutcome::CurrentGuild(publisher.publish_guild(current_guild, global).await?)
            }
            SyncSpec::Clear => {
                self.set_copied(current_guild, false);
                publisher.publish_guild(current_guild, Vec::new()).await?;
                SyncOutcome::CurrentGuild(0)
            }
        };
        Ok(outcome)
    }
}

/// Slash definitions of every command allowed to run right now.
pub fn active_application_commands(
    all: &[Command],
    extensions: &Extensions,
    is_host_command: impl Fn(&Command) -> bool,
) -> Vec<CreateCommand> {
    all.iter()
        .filter(|c| is_host_command(c) || extensions.is_command_active(&c.name))
        .filter_map(|c| c.create_as_slash_command())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cogs;

    #[derive(Default)]
    struct RecordingPublisher {
        reject: Option<GuildId>,
        calls: Mutex<Vec<(Option<GuildId>, usize)>>,
    }

    impl RecordingPublisher {
        fn calls(&self) -> Vec<(Option<GuildId>, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandPublisher for RecordingPublisher {
        async fn publish_global(&self, commands: Vec<CreateCommand>) -> Result<usize, Error> {
            self.calls.lock().unwrap().push((None, commands.len()));
            Ok(commands.len())
        }

        async fn publish_guild(
            &self,
            guild: GuildId,
            commands: Vec<CreateCommand>,
        ) -> Result<usize, Error> {
            if self.reject == Some(guild) {
                return Err(Error::Config("Missing Access".into()));
            }
            self.calls.lock().unwrap().push((Some(guild), commands.len()));
            Ok(commands.len())
        }
    }

    fn global() -> Vec<CreateCommand> {
        vec![
            CreateCommand::new("ping").description("Responds with Pong!"),
            CreateCommand::new("load").description("Load a cog"),
        ]
    }

    fn home() -> GuildId {
        GuildId::new(100)
    }

    #[test]
    fn parses_guilds_and_trailing_spec() {
        assert_eq!(
            SyncRequest::parse("").unwrap(),
            SyncRequest { guilds: vec![], spec: SyncSpec::Global }
        );
        assert_eq!(SyncRequest::parse("^").unwrap().spec, SyncSpec::Clear);
        let req = SyncRequest::parse("11 22 *").unwrap();
        assert_eq!(req.guilds, vec![GuildId::new(11), GuildId::new(22)]);
        assert_eq!(req.spec, SyncSpec::CopyGlobal);
    }

    #[test]
    fn rejects_misplaced_spec_and_garbage() {
        assert!(SyncRequest::parse("~ 11").is_err());
        assert!(SyncRequest::parse("everywhere").is_err());
        assert!(SyncRequest::parse("0").is_err());
    }

    #[tokio::test]
    async fn partial_target_failure_is_counted() {
        let publisher = RecordingPublisher {
            reject: Some(GuildId::new(2)),
            ..Default::default()
        };
        let request = SyncRequest::parse("1 2 3").unwrap();
        let outcome = CommandTree::default()
            .sync(&publisher, global(), home(), request)
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Targets { synced: 2, attempted: 3 });
        assert_eq!(outcome.to_string(), "Synced the tree to 2/3.");
        assert_eq!(publisher.calls().len(), 2);
    }

    #[tokio::test]
    async fn global_sync_publishes_everything() {
        let publisher = RecordingPublisher::default();
        let outcome = CommandTree::default()
            .sync(&publisher, global(), home(), SyncRequest::parse("").unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.to_string(), "Synced 2 commands globally.");
        assert_eq!(publisher.calls(), vec![(None, 2)]);
    }

    #[tokio::test]
    async fn copy_then_current_then_clear() {
        let publisher = RecordingPublisher::default();
        let tree = CommandTree::default();

        let current = tree
            .sync(&publisher, global(), home(), SyncRequest::parse("~").unwrap())
            .await
            .unwrap();
        assert_eq!(current, SyncOutcome::CurrentGuild(0));

        let copied = tree
            .sync(&publisher, global(), home(), SyncRequest::parse("*").unwrap())
            .await
            .unwrap();
        assert_eq!(copied.to_string(), "Synced 2 commands to the current guild.");

        let current = tree
            .sync(&publisher, global(), home(), SyncRequest::parse("~").unwrap())
            .await
            .unwrap();
        assert_eq!(current, SyncOutcome::CurrentGuild(2));

        let cleared = tree
            .sync(&publisher, global(), home(), SyncRequest::parse("^").unwrap())
            .await
            .unwrap();
        assert_eq!(cleared, SyncOutcome::CurrentGuild(0));
        assert_eq!(publisher.calls().last(), Some(&(Some(home()), 0)));
    }

    #[tokio::test]
    async fn rejected_current_guild_sync_is_an_error() {
        let publisher = RecordingPublisher {
            reject: Some(home()),
            ..Default::default()
        };
        let result = CommandTree::default()
            .sync(&publisher, global(), home(), SyncRequest::parse("*").unwrap())
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn only_active_commands_are_published() {
        let ext = Extensions::new(cogs::catalog());
        let all = cogs::command_definitions(&cogs::catalog());

        assert!(active_application_commands(&all, &ext, |_| false).is_empty());

        ext.load("cogs.test").unwrap();
        assert_eq!(active_application_commands(&all, &ext, |_| false).len(), 1);

        ext.unload("cogs.test").unwrap();
        assert_eq!(active_application_commands(&all, &ext, |_| true).len(), 1);
    }
}
