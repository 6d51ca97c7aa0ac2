use crate::config::DatabaseConfig;
use crate::error::Error;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

type Query<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// A single bound parameter or decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One decoded row, columns kept in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    fn decode(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let mut columns = Vec::with_capacity(row.columns().len());
        for column in row.columns() {
            let idx = column.ordinal();
            let raw = row.try_get_raw(idx)?;
            let value = if raw.is_null() {
                Value::Null
            } else {
                let type_name = raw.type_info().name().to_ascii_uppercase();
                match type_name.as_str() {
                    "INTEGER" | "BOOLEAN" | "INT8" => Value::Integer(row.try_get(idx)?),
                    "REAL" => Value::Real(row.try_get(idx)?),
                    "BLOB" => Value::Blob(row.try_get(idx)?),
                    _ => Value::Text(row.try_get(idx)?),
                }
            };
            columns.push((column.name().to_string(), value));
        }
        Ok(Self { columns })
    }
}

/// Result handle of a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOutcome {
    pub rows_affected: u64,
    pub last_insert_rowid: i64,
}

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub discord_id: u64,
    pub name: String,
    pub joined_at: Option<String>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    discord_id: i64,
    name: String,
    joined_at: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            discord_id: row.discord_id as u64,
            name: row.name,
            joined_at: row.joined_at,
        }
    }
}

/// Pooled SQLite store shared by the host and every cog.
///
/// The pool is created lazily by [`Database::connect`] and dropped by
/// [`Database::disconnect`]; both are safe to call repeatedly.
pub struct Database {
    config: DatabaseConfig,
    pool: RwLock<Option<SqlitePool>>,
    allocations: AtomicUsize,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
            allocations: AtomicUsize::new(0),
        }
    }

    /// Open the connection pool if it is not open yet.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            debug!("Database already connected");
            return Ok(());
        }

        let options = SqliteConnectOptions::from_str(&self.config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections())
            .connect_with(options)
            .await?;

        self.allocations.fetch_add(1, Ordering::SeqCst);
        *guard = Some(pool);

        info!(
            url = %self.config.url,
            pool_size = self.config.pool_size,
            max_overflow = self.config.max_overflow,
            "Database connected"
        );
        Ok(())
    }

    /// Close the pool. Does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let pool = self.pool.write().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            info!("Database disconnected");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// Number of pools this wrapper has opened over its lifetime.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    async fn pool(&self) -> Result<SqlitePool, Error> {
        self.pool.read().await.clone().ok_or(Error::NotConnected)
    }

    /// Apply the embedded migrations. Tables are created only if absent.
    pub async fn ensure_schema(&self) -> Result<(), Error> {
        let pool = self.pool().await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database schema ensured");
        Ok(())
    }

    /// Run a parameterized read and decode every returned row.
    pub async fn fetch_all(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let pool = self.pool().await?;
        let rows = bind_all(sqlx::query(statement), params)
            .fetch_all(&pool)
            .await?;
        rows.iter()
            .map(Row::decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Run a parameterized write. SQLite commits it before returning.
    pub async fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecuteOutcome, Error> {
        let pool = self.pool().await?;
        let result = bind_all(sqlx::query(statement), params)
            .execute(&pool)
            .await?;
        Ok(ExecuteOutcome {
            rows_affected: result.rows_affected(),
            last_insert_rowid: result.last_insert_rowid(),
        })
    }

    /// Record a user on sight. The name is refreshed, `joined_at` is kept from the first insert.
    pub async fn upsert_user(&self, discord_id: u64, name: &str) -> Result<User, Error> {
        let joined_at = chrono::Utc::now().to_rfc3339();
        self.execute(
            "INSERT INTO users (discord_id, name, joined_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(discord_id) DO UPDATE SET name = excluded.name",
            &[discord_id.into(), name.into(), joined_at.into()],
        )
        .await?;

        self.get_user(discord_id)
            .await?
            .ok_or(Error::Database(sqlx::Error::RowNotFound))
    }

    pub async fn get_user(&self, discord_id: u64) -> Result<Option<User>, Error> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT discord_id, name, joined_at FROM users WHERE discord_id = ?1",
        )
        .bind(discord_id as i64)
        .fetch_optional(&pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn count_users(&self) -> Result<i64, Error> {
        let pool = self.pool().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await?;
        Ok(count)
    }
}

fn bind_all<'q>(mut query: Query<'q>, params: &'q [Value]) -> Query<'q> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<i64>),
            Value::Integer(v) => query.bind(*v),
            Value::Real(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Blob(v) => query.bind(v.as_slice()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> Database {
        let url = format!("sqlite:{}", dir.path().join("bot.db").display());
        let db = Database::new(DatabaseConfig::new(url));
        db.connect().await.unwrap();
        db.ensure_schema().await.unwrap();
        db
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        db.connect().await.unwrap();
        assert_eq!(db.allocations(), 1);
        assert!(db.is_connected().await);
    }

    #[tokio::test]
    async fn disconnect_twice_is_noop() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        db.disconnect().await;
        db.disconnect().await;
        assert!(!db.is_connected().await);
        assert!(matches!(
            db.fetch_all("SELECT 1", &[]).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn schema_twice_leaves_one_table() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        db.ensure_schema().await.unwrap();

        let rows = db
            .fetch_all(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                &["users".into()],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn fetch_all_decodes_every_row() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        for (id, name) in [(1u64, "alpha"), (2, "beta"), (3, "gamma")] {
            db.execute(
                "INSERT INTO users (discord_id, name) VALUES (?1, ?2)",
                &[id.into(), name.into()],
            )
            .await
            .unwrap();
        }

        let rows = db
            .fetch_all("SELECT discord_id, name, joined_at FROM users ORDER BY discord_id", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get("name").and_then(Value::as_str), Some("gamma"));
        assert_eq!(rows[0].get("discord_id").and_then(Value::as_i64), Some(1));
        assert!(rows[1].get("joined_at").is_some_and(Value::is_null));
    }

    #[tokio::test]
    async fn execute_reports_affected_rows() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        let outcome = db
            .execute(
                "INSERT INTO users (discord_id, name) VALUES (?1, ?2)",
                &[42u64.into(), "answer".into()],
            )
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_rowid, 42);
    }

    #[tokio::test]
    async fn upsert_keeps_first_join_time() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        let id = 284_102_938_475_610_112u64;

        let first = db.upsert_user(id, "old-name").await.unwrap();
        let second = db.upsert_user(id, "new-name").await.unwrap();

        assert_eq!(second.discord_id, id);
        assert_eq!(second.name, "new-name");
        assert_eq!(second.joined_at, first.joined_at);
        assert_eq!(db.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_statement_propagates() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        let err = db.fetch_all("SELECT * FROM nope", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
