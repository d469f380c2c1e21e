use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_entries (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT
);
"#;

/// Open (or create) the local key-value database. Pass `None` for an in-memory database.
pub fn open_database(path: Option<&std::path::Path>) -> Result<Connection> {
    let conn = match path {
        Some(p) => {
            if let Some(parent) = p.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create store directory {}", parent.display())
                    })?;
                }
            }
            let conn = Connection::open(p).context("Failed to open store database")?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")
                .context("Failed to set PRAGMA options")?;
            conn
        }
        None => Connection::open_in_memory().context("Failed to open in-memory database")?,
    };

    conn.execute_batch("PRAGMA busy_timeout = 5000;")
        .context("Failed to set PRAGMA options")?;
    conn.execute_batch(SCHEMA)
        .context("Failed to create store schema")?;

    Ok(conn)
}

/// Read the raw value stored under `key`.
pub fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM kv_entries WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("Failed to read store entry '{}'", key))
}

/// Insert or replace the value stored under `key`.
pub fn put_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now],
    )
    .with_context(|| format!("Failed to write store entry '{}'", key))?;
    Ok(())
}

/// Remove `key`. Returns whether an entry existed.
pub fn delete_value(conn: &Connection, key: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
        .with_context(|| format!("Failed to delete store entry '{}'", key))?;
    Ok(deleted > 0)
}
