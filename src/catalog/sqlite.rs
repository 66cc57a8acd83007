use crate::error::{Error, Result};
use crate::types::{ComicFile, ComicId, ContentHash};
use async_trait::async_trait;
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::{ComicCatalog, existing_file};

/// Row of the `comics` table
#[derive(Debug, Clone, FromRow)]
struct ComicRow {
    path: String,
    page_count: Option<i64>,
}

/// Catalog backed by a SQLite `comics(id, path, page_count, content_hash)` table
#[derive(Clone, Debug)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Open (or create) a catalog database file
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(format!("failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Database(format!("failed to parse database path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| Error::Database(format!("failed to connect to database: {}", e)))?;

        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the `comics` table if it is missing
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let catalog = Self { pool };
        catalog.ensure_schema().await?;
        Ok(catalog)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comics (
                id INTEGER PRIMARY KEY,
                path TEXT NOT NULL,
                page_count INTEGER,
                content_hash TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("failed to create comics table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comics_content_hash ON comics(content_hash)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to create hash index: {}", e)))?;

        Ok(())
    }

    /// Insert a comic or update its path and page count
    pub async fn upsert_comic(
        &self,
        comic_id: ComicId,
        path: impl Into<PathBuf>,
        page_count: Option<u32>,
    ) -> Result<()> {
        let path: PathBuf = path.into();
        sqlx::query(
            r#"
            INSERT INTO comics (id, path, page_count)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                page_count = excluded.page_count
            "#,
        )
        .bind(comic_id.get())
        .bind(path.to_string_lossy().to_string())
        .bind(page_count.map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("failed to upsert comic {}: {}", comic_id, e)))?;

        Ok(())
    }

    /// Record the content hash of a comic's archive
    pub async fn set_content_hash(&self, comic_id: ComicId, hash: &ContentHash) -> Result<()> {
        let result = sqlx::query("UPDATE comics SET content_hash = ? WHERE id = ?")
            .bind(hash.as_str())
            .bind(comic_id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(format!("failed to set content hash for {}: {}", comic_id, e))
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::ComicNotFound {
                comic_id,
                reason: "not in catalog".to_string(),
            });
        }
        Ok(())
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ComicCatalog for SqliteCatalog {
    async fn get_comic_file(&self, comic_id: ComicId) -> Result<ComicFile> {
        let row = sqlx::query_as::<_, ComicRow>("SELECT path, page_count FROM comics WHERE id = ?")
            .bind(comic_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to look up comic {}: {}", comic_id, e)))?
            .ok_or_else(|| Error::ComicNotFound {
                comic_id,
                reason: "not in catalog".to_string(),
            })?;

        let file = ComicFile {
            path: PathBuf::from(row.path),
            declared_page_count: row.page_count.and_then(|count| u32::try_from(count).ok()),
        };
        existing_file(comic_id, file).await
    }

    async fn comics_with_hash(&self, hash: &ContentHash) -> Result<Vec<ComicId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM comics WHERE content_hash = ? ORDER BY id")
                .bind(hash.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(format!("failed to find comics by content hash: {}", e))
                })?;

        Ok(ids.into_iter().map(ComicId).collect())
    }
}
