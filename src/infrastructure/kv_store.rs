use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Origin-scoped string storage with synchronous access.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set(&self, key: &str, value: &str) -> Result<(), InfraError>;
    fn remove(&self, key: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("key/value store: {error}")))
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db_path: PathBuf,
}

impl SqliteKeyValueStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, InfraError> {
        let store = Self {
            db_path: db_path.as_ref().to_path_buf(),
        };
        store.connect()?.execute_batch(SCHEMA_SQL)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value = connection
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_overwrites_and_removes() {
        let store = InMemoryKeyValueStore::default();
        assert_eq!(store.get("clock.mode").expect("get"), None);

        store.set("clock.mode", "focus").expect("set");
        store.set("clock.mode", "break").expect("overwrite");
        assert_eq!(store.get("clock.mode").expect("get").as_deref(), Some("break"));

        store.remove("clock.mode").expect("remove");
        assert_eq!(store.get("clock.mode").expect("get"), None);
    }

    #[test]
    fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("clock.sqlite");

        let store = SqliteKeyValueStore::open(&path).expect("open store");
        store.set("clock.seconds", "1300").expect("set");
        store.set("clock.seconds", "1299").expect("overwrite");
        drop(store);

        let reopened = SqliteKeyValueStore::open(&path).expect("reopen store");
        assert_eq!(
            reopened.get("clock.seconds").expect("get").as_deref(),
            Some("1299")
        );
        reopened.remove("clock.seconds").expect("remove");
        assert_eq!(reopened.get("clock.seconds").expect("get"), None);
    }

    #[test]
    fn sqlite_store_reports_unopenable_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("missing").join("clock.sqlite");
        assert!(matches!(
            SqliteKeyValueStore::open(&path),
            Err(InfraError::Sqlite(_))
        ));
    }
}
