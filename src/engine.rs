//! Engine — drives each candidate post through triage, rate limiting,
//! generation, and submission.
//!
//! Ordering invariant: the cooldown ledger is committed and the post
//! marked processed only after the platform confirms the reply went
//! out. A submit failure leaves both untouched so the post stays
//! retryable next cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::error::{Error, LedgerError};
use crate::generation::{GenerationOrchestrator, Outcome};
use crate::ledger::{CooldownLedger, DenyReason, ReserveOutcome};
use crate::platform::Platform;
use crate::store::{AuditEvent, AuditKind, Database};
use crate::triage::{Decision, MatchEngine, PolicyGate, Post, RejectReason};

/// Terminal result of processing one candidate post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// PolicyGate rejected the post.
    Rejected(RejectReason),
    /// The cooldown ledger denied a reservation this cycle.
    RateLimited(DenyReason),
    /// Reply generated, submitted, and recorded.
    Replied { provider: String },
    /// Every provider in the chain failed; the post stays retryable.
    GenerationFailed { attempts: usize },
    /// The platform refused the reply; nothing was recorded.
    SubmitFailed { reason: String },
}

// ── Per-post processor ──────────────────────────────────────────────

/// Runs one post through the full decision pipeline.
pub struct PostProcessor {
    matcher: MatchEngine,
    policy: PolicyGate,
    ledger: CooldownLedger,
    orchestrator: GenerationOrchestrator,
    platform: Arc<dyn Platform>,
    db: Arc<dyn Database>,
}

impl PostProcessor {
    pub fn new(
        matcher: MatchEngine,
        policy: PolicyGate,
        ledger: CooldownLedger,
        orchestrator: GenerationOrchestrator,
        platform: Arc<dyn Platform>,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            matcher,
            policy,
            ledger,
            orchestrator,
            platform,
            db,
        }
    }

    /// Append an audit event. Failures are logged, never fatal.
    async fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.db.append_audit(&event).await {
            warn!(error = %e, kind = event.kind.as_str(), "Failed to append audit event");
        }
    }

    /// Process a single candidate post.
    pub async fn process(&self, post: &Post) -> Result<PostOutcome, Error> {
        self.audit(AuditEvent::for_post(AuditKind::PostChecked, post, None))
            .await;

        let already_processed = self.db.is_processed(&post.id).await?;
        let verdict = self.matcher.evaluate(post);

        if verdict.matched {
            let detail = format!(
                "pattern={} category={}",
                verdict.pattern.as_deref().unwrap_or(""),
                verdict.category.as_deref().unwrap_or("")
            );
            self.audit(AuditEvent::for_post(
                AuditKind::KeywordMatched,
                post,
                Some(detail),
            ))
            .await;
        }

        let category = match self.policy.decide(post, &verdict, already_processed) {
            Decision::Reject(reason) => {
                debug!(post_id = %post.id, reason = reason.label(), "Post rejected");
                return Ok(PostOutcome::Rejected(reason));
            }
            Decision::Accept { category } => category,
        };

        let reservation = match self.ledger.try_reserve(Utc::now()).await? {
            ReserveOutcome::Denied(reason) => {
                info!(post_id = %post.id, reason = reason.label(), "Skipping post this cycle");
                return Ok(PostOutcome::RateLimited(reason));
            }
            ReserveOutcome::Granted(reservation) => reservation,
        };

        let keywords = verdict.pattern.clone().unwrap_or_default();
        let (text, provider) = match self
            .orchestrator
            .generate(post, &category, &keywords)
            .await
        {
            Outcome::AllProvidersFailed { attempts } => {
                self.audit(AuditEvent::for_post(
                    AuditKind::EngineError,
                    post,
                    Some(format!("all {} providers failed", attempts.len())),
                ))
                .await;
                self.ledger.rollback(reservation);
                return Ok(PostOutcome::GenerationFailed {
                    attempts: attempts.len(),
                });
            }
            Outcome::Success { text, provider, .. } => {
                self.audit(AuditEvent::for_post(
                    AuditKind::ResponseGenerated,
                    post,
                    Some(format!("provider={provider}")),
                ))
                .await;
                (text, provider)
            }
        };

        if let Err(e) = self.platform.submit(&post.id, &text).await {
            warn!(post_id = %post.id, error = %e, "Reply submission failed");
            self.audit(AuditEvent::for_post(
                AuditKind::ReplyFailed,
                post,
                Some(e.to_string()),
            ))
            .await;
            self.ledger.rollback(reservation);
            return Ok(PostOutcome::SubmitFailed {
                reason: e.to_string(),
            });
        }

        // The reply is out. A lost quota race or a failing store must
        // not resurrect the post, so neither aborts here.
        match self.ledger.commit(Utc::now()).await {
            Ok(()) => {}
            Err(LedgerError::LostRace) => {
                warn!(post_id = %post.id, "Reply sent but quota was consumed concurrently");
            }
            Err(LedgerError::Database(e)) => {
                warn!(post_id = %post.id, error = %e, "Reply sent but ledger commit failed");
                self.audit(AuditEvent::for_post(
                    AuditKind::EngineError,
                    post,
                    Some(format!("ledger commit failed: {e}")),
                ))
                .await;
            }
        }

        if let Err(e) = self
            .db
            .mark_processed(&post.id, &post.source, Utc::now())
            .await
        {
            warn!(post_id = %post.id, error = %e, "Reply sent but mark_processed failed");
        }

        self.audit(AuditEvent::for_post(
            AuditKind::ReplyPosted,
            post,
            Some(format!("provider={provider}")),
        ))
        .await;

        info!(post_id = %post.id, provider = %provider, "Replied to post");
        Ok(PostOutcome::Replied { provider })
    }
}

// ── Polling loop ────────────────────────────────────────────────────

/// Watches configured sources and feeds new posts through the processor.
pub struct Bot {
    processor: PostProcessor,
    platform: Arc<dyn Platform>,
    db: Arc<dyn Database>,
    config: BotConfig,
}

impl Bot {
    pub fn new(
        processor: PostProcessor,
        platform: Arc<dyn Platform>,
        db: Arc<dyn Database>,
        config: BotConfig,
    ) -> Self {
        Self {
            processor,
            platform,
            db,
            config,
        }
    }

    /// Run polling cycles until the process exits.
    pub async fn run(&self) -> Result<(), Error> {
        info!(
            sources = ?self.config.sources,
            interval_secs = self.config.poll_interval.as_secs(),
            "Bot started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// One polling cycle over all sources.
    pub async fn run_cycle(&self) {
        info!("Starting check cycle");
        let cutoff = Utc::now() - chrono::Duration::hours(self.config.max_post_age_hours);

        for source in &self.config.sources {
            let posts = match self
                .platform
                .fetch_new(source, self.config.fetch_limit)
                .await
            {
                Ok(posts) => posts,
                Err(e) => {
                    error!(source = %source, error = %e, "Failed to fetch posts");
                    continue;
                }
            };

            info!(source = %source, count = posts.len(), "Fetched posts");

            for post in &posts {
                if post.created_at < cutoff {
                    debug!(post_id = %post.id, "Skipping stale post");
                    continue;
                }

                match self.processor.process(post).await {
                    Ok(outcome) => debug!(post_id = %post.id, outcome = ?outcome, "Post handled"),
                    Err(e) => error!(post_id = %post.id, error = %e, "Failed to process post"),
                }

                // Brief pause so reply bursts don't hammer the platform.
                let jitter = rand::thread_rng().gen_range(800..1600);
                tokio::time::sleep(Duration::from_millis(jitter)).await;
            }
        }

        self.prune().await;

        match self.db.audit_counts().await {
            Ok(counts) => info!(
                posts_checked = counts.posts_checked,
                keywords_matched = counts.keywords_matched,
                replies_posted = counts.replies_posted,
                replies_failed = counts.replies_failed,
                "Check cycle completed"
            ),
            Err(e) => warn!(error = %e, "Failed to read audit counts"),
        }
    }

    async fn prune(&self) {
        let now = Utc::now();
        let audit_cutoff = now - chrono::Duration::days(self.config.audit_keep_days as i64);
        match self.db.prune_audit(audit_cutoff).await {
            Ok(0) => {}
            Ok(n) => debug!(deleted = n, "Pruned audit log"),
            Err(e) => warn!(error = %e, "Audit prune failed"),
        }

        let processed_cutoff =
            now - chrono::Duration::days(self.config.processed_keep_days as i64);
        match self.db.prune_processed(processed_cutoff).await {
            Ok(0) => {}
            Ok(n) => debug!(deleted = n, "Pruned processed set"),
            Err(e) => warn!(error = %e, "Processed-set prune failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::{PlatformError, ProviderError};
    use crate::generation::{PromptLibrary, QualityGate, ReplyProvider};
    use crate::ledger::CooldownPolicy;
    use crate::store::LibSqlBackend;
    use crate::triage::matcher::{Blacklist, KeywordRule, MatchType, RuleScope};

    const GOOD_REPLY: &str =
        "Maybe start by writing down what you want from the move; it makes the \
         conversation with your manager much easier.";

    struct StubProvider;

    #[async_trait]
    impl ReplyProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(GOOD_REPLY.to_string())
        }
    }

    /// Platform that records submissions and can be told to fail.
    struct MockPlatform {
        fail_submit: bool,
        submitted: Mutex<Vec<(String, String)>>,
    }

    impl MockPlatform {
        fn new(fail_submit: bool) -> Self {
            Self {
                fail_submit,
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Platform for MockPlatform {
        fn name(&self) -> &str {
            "mock"
        }
        async fn fetch_new(
            &self,
            _source: &str,
            _limit: usize,
        ) -> Result<Vec<Post>, PlatformError> {
            Ok(vec![])
        }
        async fn submit(&self, post_id: &str, text: &str) -> Result<(), PlatformError> {
            if self.fail_submit {
                return Err(PlatformError::SubmitRejected {
                    post_id: post_id.to_string(),
                    reason: "THREAD_LOCKED".into(),
                });
            }
            self.submitted
                .lock()
                .unwrap()
                .push((post_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn make_post(id: &str, title: &str) -> Post {
        Post {
            id: id.into(),
            source: "india".into(),
            title: title.into(),
            body: String::new(),
            author: "someone".into(),
            score: 10,
            locked: false,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    async fn make_processor(
        platform: Arc<MockPlatform>,
        max_replies_per_hour: u64,
    ) -> (PostProcessor, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());

        let matcher = MatchEngine::compile(&[KeywordRule {
            pattern: "help".into(),
            match_type: MatchType::Partial,
            scope: RuleScope::Both,
            priority: 2,
            category: "helpful_advice".into(),
        }])
        .unwrap();

        let policy = PolicyGate::new(Blacklist::empty(), 0);
        let ledger = CooldownLedger::new(
            db.clone(),
            CooldownPolicy {
                max_replies_per_hour,
                min_cooldown: Duration::from_secs(0),
            },
        );
        let orchestrator = GenerationOrchestrator::new(
            vec![Arc::new(StubProvider)],
            PromptLibrary::builtin(),
            QualityGate::default(),
            Duration::from_secs(1),
        );

        (
            PostProcessor::new(matcher, policy, ledger, orchestrator, platform, db.clone()),
            db,
        )
    }

    #[tokio::test]
    async fn replied_post_is_committed_and_marked() {
        let platform = Arc::new(MockPlatform::new(false));
        let (processor, db) = make_processor(platform.clone(), 3).await;

        let outcome = processor.process(&make_post("t3_a", "need help")).await.unwrap();
        assert_eq!(
            outcome,
            PostOutcome::Replied {
                provider: "stub".into()
            }
        );

        assert!(db.is_processed("t3_a").await.unwrap());
        let window = db
            .reply_window(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(window.count, 1);
        assert_eq!(platform.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn submit_failure_leaves_state_unchanged() {
        // A failed send must not count against quota or mark the post
        // handled — the post stays retryable next cycle.
        let platform = Arc::new(MockPlatform::new(true));
        let (processor, db) = make_processor(platform, 3).await;

        let outcome = processor.process(&make_post("t3_b", "need help")).await.unwrap();
        assert!(matches!(outcome, PostOutcome::SubmitFailed { .. }));

        assert!(!db.is_processed("t3_b").await.unwrap());
        let window = db
            .reply_window(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(window.count, 0);
    }

    #[tokio::test]
    async fn unmatched_post_is_not_marked_processed() {
        // Rejected-but-unprocessed posts are re-evaluated next cycle.
        let platform = Arc::new(MockPlatform::new(false));
        let (processor, db) = make_processor(platform, 3).await;

        let outcome = processor
            .process(&make_post("t3_c", "gardening tips"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PostOutcome::Rejected(RejectReason::NoKeywordMatch)
        );
        assert!(!db.is_processed("t3_c").await.unwrap());
    }

    #[tokio::test]
    async fn processed_post_is_final() {
        let platform = Arc::new(MockPlatform::new(false));
        let (processor, db) = make_processor(platform.clone(), 3).await;

        processor.process(&make_post("t3_d", "need help")).await.unwrap();
        let outcome = processor.process(&make_post("t3_d", "need help")).await.unwrap();

        assert_eq!(
            outcome,
            PostOutcome::Rejected(RejectReason::AlreadyProcessed)
        );
        // Only the first pass submitted.
        assert_eq!(platform.submitted.lock().unwrap().len(), 1);
        assert_eq!(db.processed_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn quota_exhaustion_rate_limits_the_next_post() {
        let platform = Arc::new(MockPlatform::new(false));
        let (processor, _db) = make_processor(platform, 1).await;

        processor.process(&make_post("t3_e", "need help")).await.unwrap();
        let outcome = processor.process(&make_post("t3_f", "more help")).await.unwrap();

        assert_eq!(
            outcome,
            PostOutcome::RateLimited(DenyReason::HourlyQuotaExceeded)
        );
    }
}
