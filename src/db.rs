use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::credentials::SettingsStore;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, now],
        )?;
        Ok(())
    }
}

impl SettingsStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.setting(key)
            .with_context(|| format!("failed to read setting {key}"))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_setting(key, value)
            .with_context(|| format!("failed to store setting {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::open(&dir.path().join("nested").join("jellympv.db")).expect("open db");
        db.migrate().expect("migrate");
        (dir, db)
    }

    #[test]
    fn missing_setting_reads_as_none() {
        let (_dir, db) = open_temp();
        assert_eq!(db.setting("api_key").expect("query"), None);
    }

    #[test]
    fn set_setting_overwrites_previous_value() {
        let (_dir, db) = open_temp();
        db.set_setting("api_key", "first").expect("insert");
        db.set_setting("api_key", "second").expect("update");
        assert_eq!(db.setting("api_key").expect("query").as_deref(), Some("second"));
    }

    #[test]
    fn settings_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jellympv.db");
        {
            let db = Database::open(&path).expect("open");
            db.migrate().expect("migrate");
            SettingsStore::set(&db, "user_id", "user-1").expect("store");
        }
        let db = Database::open(&path).expect("reopen");
        db.migrate().expect("migrate again");
        assert_eq!(
            SettingsStore::get(&db, "user_id").expect("read").as_deref(),
            Some("user-1")
        );
    }
}
