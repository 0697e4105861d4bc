//! SQLite-backed chunk store.
//!
//! Handles connection, migrations and the two keyed tables.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::types::{FileMeta, StoreError};
use super::ChunkStore;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the SQLite chunk database.
///
/// The database file is stored under the XDG state directory:
/// `~/.local/state/resdl/chunks.db` on Debian.
#[derive(Clone)]
pub struct SqliteChunkStore {
    pool: Pool<Sqlite>,
}

impl SqliteChunkStore {
    /// Open (or create) the default chunk database and run migrations.
    pub async fn open_default() -> Result<Self, StoreError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("resdl")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open_at(xdg_dirs.get_state_home().join("chunks.db")).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;
        let store = SqliteChunkStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open a private in-memory database (no disk I/O).
    pub async fn open_memory() -> Result<Self, StoreError> {
        // Single connection so the pool never hands back a different empty DB.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = SqliteChunkStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Close every pooled connection; later calls on this handle fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        // `seq` orders chunks within a file; chunks are only ever appended.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_chunks (
                file_name TEXT NOT NULL,
                seq INTEGER NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY (file_name, seq)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_meta (
                file_name TEXT PRIMARY KEY,
                total_size INTEGER,
                etag TEXT,
                last_modified TEXT,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn append_chunk(&self, file: &str, bytes: &[u8]) -> Result<(), StoreError> {
        // One statement, so the next seq and the insert are atomic.
        sqlx::query(
            r#"
            INSERT INTO file_chunks (file_name, seq, data)
            VALUES (
                ?1,
                COALESCE((SELECT MAX(seq) FROM file_chunks WHERE file_name = ?1), -1) + 1,
                ?2
            )
            "#,
        )
        .bind(file)
        .bind(bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_chunks(&self, file: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM file_chunks
            WHERE file_name = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(file)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get::<Vec<u8>, _>("data")).collect())
    }

    async fn clear_chunks(&self, file: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM file_chunks WHERE file_name = ?1")
            .bind(file)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_meta(&self, file: &str, meta: &FileMeta) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO file_meta (file_name, total_size, etag, last_modified, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(file_name) DO UPDATE SET
                total_size = excluded.total_size,
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(file)
        .bind(meta.total_size.map(|n| n as i64))
        .bind(&meta.etag)
        .bind(&meta.last_modified)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_meta(&self, file: &str) -> Result<Option<FileMeta>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT total_size, etag, last_modified
            FROM file_meta
            WHERE file_name = ?1
            "#,
        )
        .bind(file)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let total_size: Option<i64> = row.get("total_size");
            FileMeta {
                total_size: total_size.map(|n| n.max(0) as u64),
                etag: row.get("etag"),
                last_modified: row.get("last_modified"),
            }
        }))
    }

    async fn clear_meta(&self, file: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM file_meta WHERE file_name = ?1")
            .bind(file)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sum_chunk_bytes(&self, file: &str) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(LENGTH(data)), 0) AS total
            FROM file_chunks
            WHERE file_name = ?1
            "#,
        )
        .bind(file)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.get("total");
        Ok(total.max(0) as u64)
    }

    async fn list_files(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT file_name FROM file_chunks
            UNION
            SELECT file_name FROM file_meta
            ORDER BY file_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("file_name")).collect())
    }
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
