//! Built-in cogs and the catalog the host loads them from.
//!
//! A cog bundles commands and event listeners under one qualified name
//! (`cogs.<module>`). The host never scans the filesystem: every cog is listed
//! in [`catalog`] with the constructor that builds it.

pub mod events;

use crate::{Command, Data};
use async_trait::async_trait;
use serenity::all::{Context as SerenityContext, FullEvent};
use std::sync::Arc;
use tracing::{info, warn};

type Error = crate::error::Error;

/// Prefix shared by every qualified cog name.
pub const NAMESPACE: &str = "cogs";

/// Gateway events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Resume,
    Message,
    GuildCreate,
    GuildMemberAddition,
    InteractionCreate,
    Other,
}

impl EventKind {
    pub fn of(event: &FullEvent) -> Self {
        match event {
            FullEvent::Ready { .. } => EventKind::Ready,
            FullEvent::Resume { .. } => EventKind::Resume,
            FullEvent::Message { .. } => EventKind::Message,
            FullEvent::GuildCreate { .. } => EventKind::GuildCreate,
            FullEvent::GuildMemberAddition { .. } => EventKind::GuildMemberAddition,
            FullEvent::InteractionCreate { .. } => EventKind::InteractionCreate,
            _ => EventKind::Other,
        }
    }
}

/// An event callback owned by a cog.
#[async_trait]
pub trait Listener: Send + Sync {
    fn event(&self) -> EventKind;

    async fn handle(
        &self,
        ctx: &SerenityContext,
        event: &FullEvent,
        data: &Data,
    ) -> Result<(), Error>;
}

/// A loadable unit of commands and listeners.
pub struct Cog {
    name: &'static str,
    commands: Vec<Command>,
    listeners: Vec<Arc<dyn Listener>>,
}

impl Cog {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            commands: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn listener(mut self, listener: impl Listener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name.as_str())
    }

    pub fn listeners(&self) -> &[Arc<dyn Listener>] {
        &self.listeners
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Catalog entry: a qualified name and the constructor for its cog.
#[derive(Clone, Copy)]
pub struct ExtensionSpec {
    pub name: &'static str,
    pub setup: fn() -> Result<Cog, Error>,
}

/// Every cog shipped with the bot, in load order.
pub fn catalog() -> Vec<ExtensionSpec> {
    vec![
        ExtensionSpec {
            name: "cogs.events",
            setup: events::setup,
        },
        ExtensionSpec {
            name: "cogs.test",
            setup: test::setup,
        },
    ]
}

/// Qualified names of every cataloged cog.
pub fn discover_modules() -> Vec<&'static str> {
    catalog().into_iter().map(|spec| spec.name).collect()
}

/// Turn `test` into `cogs.test`; qualified names pass through.
pub fn qualify(name: &str) -> String {
    let name = name.trim();
    if name.starts_with(&format!("{NAMESPACE}.")) {
        name.to_string()
    } else {
        format!("{NAMESPACE}.{name}")
    }
}

/// Commands of every cataloged cog, handed to the framework at startup so it
/// can route them. Whether one may run is decided by the loaded set.
pub fn command_definitions(catalog: &[ExtensionSpec]) -> Vec<Command> {
    catalog
        .iter()
        .filter_map(|spec| match (spec.setup)() {
            Ok(cog) => Some(cog.into_commands()),
            Err(e) => {
                warn!(extension = spec.name, error = %e, "Skipping commands of broken extension");
                None
            }
        })
        .flatten()
        .collect()
}

/// Logs `<cog> loaded and ready.` on every gateway Ready.
pub struct ReadyLog {
    cog: &'static str,
}

impl ReadyLog {
    pub fn new(cog: &'static str) -> Self {
        Self { cog }
    }
}

#[async_trait]
impl Listener for ReadyLog {
    fn event(&self) -> EventKind {
        EventKind::Ready
    }

    async fn handle(&self, _: &SerenityContext, _: &FullEvent, _: &Data) -> Result<(), Error> {
        info!(cog = self.cog, "{} loaded and ready.", self.cog);
        Ok(())
    }
}
