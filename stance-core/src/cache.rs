//! Analysis cache.
//!
//! Successful stance summaries are stored in SQLite, keyed by thread id, so
//! re-running `analyze` or `reply` on the same thread does not pay for the
//! whole chunk pipeline again.

use crate::analysis::AnalysisOptions;
use crate::model::AnalysisReport;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors related to the analysis cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Failed to initialize cache: {0}")]
    InitializationError(String),
}

/// A cached stance summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CachedAnalysis {
    pub thread_id: i64,
    pub title: String,
    pub summary: String,
    pub analyzer_model: String,
    pub summarizer_model: String,
    pub chunk_count: i64,
    pub failed_chunks: i64,
    /// RFC 3339
    pub created_at: String,
}

impl CachedAnalysis {
    /// Build a cache entry from a report; `None` if the analysis failed
    pub fn from_report(
        report: &AnalysisReport,
        title: &str,
        options: &AnalysisOptions,
    ) -> Option<Self> {
        let summary = report.result.summary()?;
        Some(Self {
            thread_id: report.thread_id as i64,
            title: title.to_string(),
            summary: summary.to_string(),
            analyzer_model: options.analyzer_model.clone(),
            summarizer_model: options.summarizer_model.clone(),
            chunk_count: report.outcomes.len() as i64,
            failed_chunks: report.failed_chunks().count() as i64,
            created_at: Utc::now().to_rfc3339(),
        })
    }
}

/// SQLite store of finished analyses
pub struct AnalysisCache {
    pool: SqlitePool,
}

impl AnalysisCache {
    /// Open (or create) the cache database at the given path
    #[instrument(skip_all)]
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::InitializationError(format!("Failed to create directory: {}", e))
            })?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        debug!("Connecting to SQLite database at: {}", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;

        Self::init_schema(&pool).await?;
        info!("Analysis cache ready at {}", db_path.display());

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                thread_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                analyzer_model TEXT NOT NULL,
                summarizer_model TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                failed_chunks INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_analyses_created
            ON analyses(created_at)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Look up the cached summary of a thread
    pub async fn get(&self, thread_id: u64) -> Result<Option<CachedAnalysis>, CacheError> {
        let entry = sqlx::query_as::<_, CachedAnalysis>(
            r#"
            SELECT thread_id, title, summary, analyzer_model, summarizer_model,
                   chunk_count, failed_chunks, created_at
            FROM analyses
            WHERE thread_id = ?
            "#,
        )
        .bind(thread_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        debug!(
            "Cache {} for thread {}",
            if entry.is_some() { "hit" } else { "miss" },
            thread_id
        );
        Ok(entry)
    }

    /// Store a report, replacing any earlier entry for the thread.
    ///
    /// Failed analyses are never stored; returns whether anything was written.
    #[instrument(skip(self, report, options), fields(thread_id = report.thread_id))]
    pub async fn put(
        &self,
        report: &AnalysisReport,
        title: &str,
        options: &AnalysisOptions,
    ) -> Result<bool, CacheError> {
        let Some(entry) = CachedAnalysis::from_report(report, title, options) else {
            debug!("Not caching failed analysis");
            return Ok(false);
        };
        self.insert(&entry).await?;
        Ok(true)
    }

    /// Store a prepared entry
    pub async fn insert(&self, entry: &CachedAnalysis) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO analyses
                (thread_id, title, summary, analyzer_model, summarizer_model,
                 chunk_count, failed_chunks, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.thread_id)
        .bind(&entry.title)
        .bind(&entry.summary)
        .bind(&entry.analyzer_model)
        .bind(&entry.summarizer_model)
        .bind(entry.chunk_count)
        .bind(entry.failed_chunks)
        .bind(&entry.created_at)
        .execute(&self.pool)
        .await?;

        info!("Cached analysis of thread {}", entry.thread_id);
        Ok(())
    }

    /// Drop one thread's entry; returns whether it existed
    pub async fn remove(&self, thread_id: u64) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM analyses WHERE thread_id = ?")
            .bind(thread_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Most recently cached entries first
    pub async fn recent(&self, limit: u32) -> Result<Vec<CachedAnalysis>, CacheError> {
        let entries = sqlx::query_as::<_, CachedAnalysis>(
            r#"
            SELECT thread_id, title, summary, analyzer_model, summarizer_model,
                   chunk_count, failed_chunks, created_at
            FROM analyses
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Remove every entry; returns how many were deleted
    pub async fn clear(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM analyses")
            .execute(&self.pool)
            .await?;
        info!("Cleared {} cached analyses", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisResult, ChunkOutcome};
    use tempfile::TempDir;

    async fn create_test_cache() -> (TempDir, AnalysisCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(&dir.path().join("cache.db"))
            .await
            .unwrap();
        (dir, cache)
    }

    fn options() -> AnalysisOptions {
        AnalysisOptions {
            analyzer_model: "gemini-2.5-flash".to_string(),
            summarizer_model: "gemini-2.5-pro".to_string(),
            max_chunk_chars: 20_000,
        }
    }

    fn report(thread_id: u64, result: AnalysisResult) -> AnalysisReport {
        AnalysisReport {
            thread_id,
            result,
            outcomes: vec![
                ChunkOutcome::Success {
                    chunk_index: 1,
                    summary: "a".to_string(),
                },
                ChunkOutcome::Failure {
                    chunk_index: 2,
                    message: "b".to_string(),
                },
            ],
        }
    }

    fn success(thread_id: u64, summary: &str) -> AnalysisReport {
        report(
            thread_id,
            AnalysisResult::Success {
                summary: summary.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_dir, cache) = create_test_cache().await;

        assert!(cache.put(&success(42, "Most prefer tea"), "Tea?", &options()).await.unwrap());

        let entry = cache.get(42).await.unwrap().unwrap();
        assert_eq!(entry.summary, "Most prefer tea");
        assert_eq!(entry.title, "Tea?");
        assert_eq!(entry.chunk_count, 2);
        assert_eq!(entry.failed_chunks, 1);
        assert_eq!(entry.summarizer_model, "gemini-2.5-pro");
        assert!(cache.get(43).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_analysis_is_not_cached() {
        let (_dir, cache) = create_test_cache().await;

        let failed = report(
            7,
            AnalysisResult::Failure {
                message: "all chunks failed".to_string(),
            },
        );
        assert!(!cache.put(&failed, "t", &options()).await.unwrap());
        assert!(cache.get(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_entry() {
        let (_dir, cache) = create_test_cache().await;

        cache.put(&success(1, "old"), "t", &options()).await.unwrap();
        cache.put(&success(1, "new"), "t", &options()).await.unwrap();

        assert_eq!(cache.get(1).await.unwrap().unwrap().summary, "new");
        assert_eq!(cache.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_orders_newest_first() {
        let (_dir, cache) = create_test_cache().await;

        for (tid, created_at) in [(1, "2026-01-01T00:00:00+00:00"), (2, "2026-03-01T00:00:00+00:00")] {
            let mut entry = CachedAnalysis::from_report(&success(tid, "s"), "t", &options()).unwrap();
            entry.created_at = created_at.to_string();
            cache.insert(&entry).await.unwrap();
        }

        let recent = cache.recent(10).await.unwrap();
        let ids: Vec<i64> = recent.iter().map(|e| e.thread_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(cache.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (_dir, cache) = create_test_cache().await;

        for tid in 1..=3 {
            cache.put(&success(tid, "s"), "t", &options()).await.unwrap();
        }

        assert!(cache.remove(2).await.unwrap());
        assert!(!cache.remove(2).await.unwrap());
        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.recent(10).await.unwrap().is_empty());
    }
}
