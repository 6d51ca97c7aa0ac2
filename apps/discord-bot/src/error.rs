#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Discord API error: {0}")]
    Discord(#[from] Box<serenity::Error>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Database is not connected")]
    NotConnected,

    #[error(transparent)]
    Extension(#[from] ExtensionError),

    #[error("Command `{0}` belongs to a cog that is not loaded")]
    CommandInactive(String),
}

impl From<serenity::Error> for Error {
    fn from(err: serenity::Error) -> Self {
        Error::Discord(Box::new(err))
    }
}

/// Failures of the extension lifecycle (load, unload, reload).
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("Extension '{0}' could not be found.")]
    NotFound(String),

    #[error("Extension '{0}' is already loaded.")]
    AlreadyLoaded(String),

    #[error("Extension '{0}' has not been loaded.")]
    NotLoaded(String),

    #[error("Command '{command}' of '{extension}' is already registered by '{owner}'.")]
    CommandConflict {
        extension: String,
        command: String,
        owner: String,
    },

    #[error("Extension '{name}' raised an error during setup: {reason}")]
    Setup { name: String, reason: String },
}
