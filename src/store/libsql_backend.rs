//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored
//! as RFC 3339 strings, which compare correctly as text.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, TransactionBehavior, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{AuditCounts, AuditEvent, Database, ReplyWindow};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 string written by this backend.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Reply ledger ────────────────────────────────────────────────

    async fn reply_window(
        &self,
        window_start: DateTime<Utc>,
    ) -> Result<ReplyWindow, DatabaseError> {
        let window_str = window_start.to_rfc3339();

        // Lazy prune: entries that fell out of the window no longer
        // affect any decision, drop them on read.
        let pruned = self
            .conn()
            .execute(
                "DELETE FROM reply_log WHERE sent_at < ?1",
                params![window_str.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune reply_log: {e}")))?;
        if pruned > 0 {
            debug!(pruned, "Pruned reply log entries outside the quota window");
        }

        let mut rows = self
            .conn()
            .query("SELECT COUNT(*), MAX(sent_at) FROM reply_log", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("read reply_log: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .ok_or_else(|| DatabaseError::Query("empty COUNT result".into()))?;

        let count: i64 = row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?;
        let last: Option<String> = row.get(1).ok();

        Ok(ReplyWindow {
            count: count.max(0) as u64,
            last_reply: last.as_deref().map(parse_datetime),
        })
    }

    async fn record_reply(
        &self,
        sent_at: DateTime<Utc>,
        window_start: DateTime<Utc>,
        max_in_window: u64,
    ) -> Result<bool, DatabaseError> {
        // Immediate transaction takes the write lock up front so the
        // count-then-insert pair is serialized across workers.
        let tx = self
            .conn()
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| DatabaseError::Transaction(format!("begin: {e}")))?;

        let mut rows = tx
            .query(
                "SELECT COUNT(*) FROM reply_log WHERE sent_at >= ?1",
                params![window_start.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Transaction(format!("count: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Transaction(e.to_string()))?
            .ok_or_else(|| DatabaseError::Transaction("empty COUNT result".into()))?;
        let in_window: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::Transaction(e.to_string()))?;
        drop(rows);

        if in_window.max(0) as u64 >= max_in_window {
            // Quota already consumed by a concurrent commit — do not
            // record past it.
            tx.rollback()
                .await
                .map_err(|e| DatabaseError::Transaction(format!("rollback: {e}")))?;
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO reply_log (id, sent_at) VALUES (?1, ?2)",
            params![uuid::Uuid::new_v4().to_string(), sent_at.to_rfc3339()],
        )
        .await
        .map_err(|e| DatabaseError::Transaction(format!("insert: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("commit: {e}")))?;

        Ok(true)
    }

    // ── Processed set ───────────────────────────────────────────────

    async fn is_processed(&self, post_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM processed_posts WHERE post_id = ?1",
                params![post_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_processed: {e}")))?;

        Ok(rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .is_some())
    }

    async fn mark_processed(
        &self,
        post_id: &str,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        // INSERT OR IGNORE keeps the operation idempotent.
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO processed_posts (post_id, source, processed_at)
                 VALUES (?1, ?2, ?3)",
                params![post_id, source, at.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_processed: {e}")))?;
        Ok(())
    }

    async fn processed_count(&self) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM processed_posts", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("processed_count: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .ok_or_else(|| DatabaseError::Query("empty COUNT result".into()))?;
        let count: i64 = row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    // ── Audit log ───────────────────────────────────────────────────

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO audit_log (id, event, post_id, source, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.id.to_string(),
                    event.kind.as_str(),
                    event.post_id.clone(),
                    event.source.clone(),
                    event.detail.clone(),
                    event.at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_audit: {e}")))?;
        Ok(())
    }

    async fn audit_counts(&self) -> Result<AuditCounts, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT event, COUNT(*) FROM audit_log GROUP BY event", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("audit_counts: {e}")))?;

        let mut counts = AuditCounts::default();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let event: String = row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?;
            let n: i64 = row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?;
            let n = n.max(0) as u64;
            match event.as_str() {
                "post_checked" => counts.posts_checked = n,
                "keyword_matched" => counts.keywords_matched = n,
                "response_generated" => counts.responses_generated = n,
                "reply_posted" => counts.replies_posted = n,
                "reply_failed" => counts.replies_failed = n,
                "engine_error" => counts.errors = n,
                _ => {}
            }
        }
        Ok(counts)
    }

    // ── Retention ───────────────────────────────────────────────────

    async fn prune_audit(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM audit_log WHERE created_at < ?1",
                params![cutoff.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_audit: {e}")))?;
        Ok(deleted)
    }

    async fn prune_processed(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM processed_posts WHERE processed_at < ?1",
                params![cutoff.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_processed: {e}")))?;
        Ok(deleted)
    }
}
