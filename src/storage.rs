use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::alarms::Target;
use crate::error::{Error, Result};

/// Keys of the session store. Rendered in the host's `{prefix}-{id}` format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Record(Target, String),
    Contact(String),
    MessageQueue,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(target, id) => write!(f, "{}-{}", target.prefix(), id),
            Self::Contact(contact_id) => write!(f, "contact-{contact_id}"),
            Self::MessageQueue => f.write_str("message-queue"),
        }
    }
}

/// Key-value store scoped to one session. Values are JSON documents; every
/// access is a plain read or write, there are no transactions across calls.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: &SessionKey,
) -> Result<Option<T>> {
    match store.get(&key.to_string()).await? {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize>(store: &dyn SessionStore, key: &SessionKey, value: &T) -> Result<()> {
    store.set(&key.to_string(), serde_json::to_value(value)?).await
}

pub async fn remove(store: &dyn SessionStore, key: &SessionKey) -> Result<()> {
    store.remove(&key.to_string()).await
}

pub async fn contains(store: &dyn SessionStore, key: &SessionKey) -> Result<bool> {
    Ok(store.get(&key.to_string()).await?.is_some())
}

/// Ids of all records stored under a target prefix.
pub async fn record_ids(store: &dyn SessionStore, target: Target) -> Result<Vec<String>> {
    let prefix = format!("{}-", target.prefix());
    let keys = store.keys_with_prefix(&prefix).await?;
    Ok(keys
        .into_iter()
        .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
        .collect())
}

/// Session store backed by an in-memory SQLite database: it lives exactly as
/// long as the worker process.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    pub fn open() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS session (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::StoreLock)?;
        Ok(f(&conn)?)
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row("SELECT value FROM session WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
        })?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value)?;
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO session (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
                params![key, text],
            )
        })?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM session WHERE key = ?1", params![key]))?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM session WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
            let rows = stmt.query_map(params![prefix, prefix.chars().count() as i64], |row| row.get(0))?;
            rows.collect()
        })
    }
}
