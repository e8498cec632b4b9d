//! Async `Database` trait — single interface for all persistence.
//!
//! Covers the three persisted concerns: the reply ledger (cooldown
//! state), the processed-post set, and the audit log. The cooldown
//! reserve/commit contract lives in `ledger`; this trait only exposes
//! the storage operations it needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::triage::types::Post;

// ── Reply ledger ────────────────────────────────────────────────────

/// Snapshot of the reply log within the trailing quota window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyWindow {
    /// Replies sent at or after the window start.
    pub count: u64,
    /// Most recent reply overall (may predate the window).
    pub last_reply: Option<DateTime<Utc>>,
}

// ── Audit log ───────────────────────────────────────────────────────

/// Kind of engine event recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    PostChecked,
    KeywordMatched,
    ResponseGenerated,
    ReplyPosted,
    ReplyFailed,
    EngineError,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostChecked => "post_checked",
            Self::KeywordMatched => "keyword_matched",
            Self::ResponseGenerated => "response_generated",
            Self::ReplyPosted => "reply_posted",
            Self::ReplyFailed => "reply_failed",
            Self::EngineError => "engine_error",
        }
    }
}

/// One audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub id: Uuid,
    pub kind: AuditKind,
    pub post_id: Option<String>,
    pub source: Option<String>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    /// Event tied to a specific post.
    pub fn for_post(kind: AuditKind, post: &Post, detail: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            post_id: Some(post.id.clone()),
            source: Some(post.source.clone()),
            detail,
            at: Utc::now(),
        }
    }

    /// Event not tied to a post (startup problems, cycle failures).
    pub fn engine_error(detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: AuditKind::EngineError,
            post_id: None,
            source: None,
            detail: Some(detail.into()),
            at: Utc::now(),
        }
    }
}

/// Running totals per audit event kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditCounts {
    pub posts_checked: u64,
    pub keywords_matched: u64,
    pub responses_generated: u64,
    pub replies_posted: u64,
    pub replies_failed: u64,
    pub errors: u64,
}

// ── Database trait ──────────────────────────────────────────────────

/// Backend-agnostic persistence for the engine.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Reply ledger ────────────────────────────────────────────────

    /// Read the reply log relative to `window_start`, lazily pruning
    /// entries that fell out of the window.
    async fn reply_window(
        &self,
        window_start: DateTime<Utc>,
    ) -> Result<ReplyWindow, DatabaseError>;

    /// Record a sent reply inside a single serialized transaction.
    ///
    /// Re-counts the window inside the transaction; if it is already at
    /// `max_in_window` the row is NOT written and `false` is returned —
    /// two concurrent workers can never both record past the quota.
    async fn record_reply(
        &self,
        sent_at: DateTime<Utc>,
        window_start: DateTime<Utc>,
        max_in_window: u64,
    ) -> Result<bool, DatabaseError>;

    // ── Processed set ───────────────────────────────────────────────

    /// Whether this post id has already been handled.
    async fn is_processed(&self, post_id: &str) -> Result<bool, DatabaseError>;

    /// Add a post id to the processed set. Idempotent.
    async fn mark_processed(
        &self,
        post_id: &str,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Size of the processed set.
    async fn processed_count(&self) -> Result<u64, DatabaseError>;

    // ── Audit log ───────────────────────────────────────────────────

    /// Append an audit event.
    async fn append_audit(&self, event: &AuditEvent) -> Result<(), DatabaseError>;

    /// Totals per event kind.
    async fn audit_counts(&self) -> Result<AuditCounts, DatabaseError>;

    // ── Retention ───────────────────────────────────────────────────

    /// Delete audit entries older than `cutoff`. Returns rows deleted.
    async fn prune_audit(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError>;

    /// Delete processed-set entries older than `cutoff`. Returns rows deleted.
    async fn prune_processed(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError>;
}
