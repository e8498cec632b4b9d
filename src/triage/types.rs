//! Shared types for the triage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Candidate post ──────────────────────────────────────────────────

/// A candidate post observed during a polling cycle.
///
/// Platform adapters convert their native payload into this struct.
/// Read-only to the engine — the platform owns the underlying item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Platform-assigned unique identifier.
    pub id: String,
    /// Where the post was observed (e.g. a subreddit name).
    pub source: String,
    pub title: String,
    pub body: String,
    pub author: String,
    /// Net vote score at fetch time.
    pub score: i64,
    /// Replies are disabled on locked posts.
    pub locked: bool,
    /// The post or its author has been removed.
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

// ── Match verdict ───────────────────────────────────────────────────

/// Outcome of evaluating a post against the keyword rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchVerdict {
    pub matched: bool,
    /// Category of the winning rule, present iff `matched`.
    pub category: Option<String>,
    /// Priority of the winning rule (0 when unmatched).
    pub priority: u32,
    /// Winning rule's pattern, kept for audit logging.
    pub pattern: Option<String>,
}

impl MatchVerdict {
    /// Verdict for a post no rule matched.
    pub fn none() -> Self {
        Self {
            matched: false,
            category: None,
            priority: 0,
            pattern: None,
        }
    }
}

// ── Policy decision ─────────────────────────────────────────────────

/// Why a post was rejected, in the gate's fixed evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Already handled — definitionally final, never re-evaluated.
    AlreadyProcessed,
    /// Deleted or locked.
    PostUnavailable,
    /// Score below the configured minimum.
    LowQualityPost,
    /// A blacklist rule matched.
    Blacklisted,
    /// No keyword rule matched.
    NoKeywordMatch,
}

impl RejectReason {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyProcessed => "already_processed",
            Self::PostUnavailable => "post_unavailable",
            Self::LowQualityPost => "low_quality_post",
            Self::Blacklisted => "blacklisted",
            Self::NoKeywordMatch => "no_keyword_match",
        }
    }
}

/// Accept/reject decision for one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed to generation with this response category.
    Accept { category: String },
    Reject(RejectReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_verdict_carries_no_category() {
        let v = MatchVerdict::none();
        assert!(!v.matched);
        assert!(v.category.is_none());
        assert!(v.pattern.is_none());
        assert_eq!(v.priority, 0);
    }

    #[test]
    fn reject_reason_labels() {
        assert_eq!(RejectReason::AlreadyProcessed.label(), "already_processed");
        assert_eq!(RejectReason::Blacklisted.label(), "blacklisted");
        assert_eq!(RejectReason::NoKeywordMatch.label(), "no_keyword_match");
    }
}
