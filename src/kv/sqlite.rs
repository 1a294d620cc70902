use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use super::{KeyValueStore, KvError};

pub struct SqliteKv {
    conn: Mutex<Connection>,
    /// Last `PRAGMA data_version` seen. It moves only when another
    /// connection commits.
    seen_version: Mutex<i64>,
}

impl SqliteKv {
    pub fn open_default() -> Result<Self> {
        let path = default_db_path()?;
        Self::open(path)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create db dir {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("failed to open db {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(2))
            .context("failed to set busy timeout")?;
        init_schema(&conn)?;
        let version = data_version(&conn).context("failed to read data version")?;
        Ok(Self {
            conn: Mutex::new(conn),
            seen_version: Mutex::new(version),
        })
    }
}

impl KeyValueStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_unix()],
        )?;
        Ok(())
    }

    fn take_external_change(&self) -> Result<bool, KvError> {
        let version = data_version(&self.conn.lock())?;
        let mut seen = self.seen_version.lock();
        let changed = version != *seen;
        *seen = version;
        Ok(changed)
    }
}

fn data_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    )
    .context("failed to initialize schema")?;
    Ok(())
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data dir")?;
    Ok(base.join("yarukoto").join("store.sqlite"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_kv_round_trip() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let kv = SqliteKv::open(tmp.path()).unwrap();

        assert_eq!(kv.get("tasks").unwrap(), None);

        kv.set("tasks", "[]").unwrap();
        kv.set("tasks", r#"[{"_id":"1"}]"#).unwrap();
        assert_eq!(kv.get("tasks").unwrap().as_deref(), Some(r#"[{"_id":"1"}]"#));
    }

    #[test]
    fn notices_commits_from_another_connection_only() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mine = SqliteKv::open(tmp.path()).unwrap();
        let theirs = SqliteKv::open(tmp.path()).unwrap();
        mine.take_external_change().unwrap();

        mine.set("tasks", "[]").unwrap();
        assert!(!mine.take_external_change().unwrap());

        assert!(theirs.take_external_change().unwrap());
        assert!(!theirs.take_external_change().unwrap());
        assert_eq!(theirs.get("tasks").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.sqlite");
        {
            let kv = SqliteKv::open(&path).unwrap();
            kv.set("tasks", "[1,2]").unwrap();
            kv.set("other", "x").unwrap();
        }
        let kv = SqliteKv::open(&path).unwrap();
        assert_eq!(kv.get("tasks").unwrap().as_deref(), Some("[1,2]"));
        assert_eq!(kv.get("other").unwrap().as_deref(), Some("x"));
    }
}
