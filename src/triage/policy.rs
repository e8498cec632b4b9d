//! Policy gate — accept/reject decision for one post.
//!
//! Checks run in a fixed order and short-circuit on the first failure:
//! processed → unavailable → score → blacklist → keyword verdict.
//! Blacklist precedence over keyword matches is unconditional: a post
//! that trips a blacklist rule is rejected no matter how high the
//! winning keyword priority was.

use tracing::debug;

use crate::triage::matcher::Blacklist;
use crate::triage::types::{Decision, MatchVerdict, Post, RejectReason};

/// Combines the match verdict with blacklist and post-health checks.
pub struct PolicyGate {
    blacklist: Blacklist,
    min_post_score: i64,
}

impl PolicyGate {
    pub fn new(blacklist: Blacklist, min_post_score: i64) -> Self {
        Self {
            blacklist,
            min_post_score,
        }
    }

    /// Decide whether to respond to a post.
    ///
    /// `already_processed` is looked up by the caller beforehand so the
    /// decision itself stays a pure function.
    pub fn decide(&self, post: &Post, verdict: &MatchVerdict, already_processed: bool) -> Decision {
        if already_processed {
            return Decision::Reject(RejectReason::AlreadyProcessed);
        }

        if post.deleted || post.locked {
            return Decision::Reject(RejectReason::PostUnavailable);
        }

        if post.score < self.min_post_score {
            return Decision::Reject(RejectReason::LowQualityPost);
        }

        if let Some(pattern) = self.blacklist.hit(post) {
            debug!(post_id = %post.id, pattern = %pattern, "Post suppressed by blacklist");
            return Decision::Reject(RejectReason::Blacklisted);
        }

        match &verdict.category {
            Some(category) if verdict.matched => Decision::Accept {
                category: category.clone(),
            },
            _ => Decision::Reject(RejectReason::NoKeywordMatch),
        }
    }
}
