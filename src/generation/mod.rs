//! Reply generation — ordered provider fallback with quality gating.

pub mod prompts;
pub mod provider;
pub mod quality;

pub use prompts::{PromptLibrary, TemplateOverrides};
pub use provider::{ProviderKind, ReplyProvider, create_provider};
pub use quality::{QualityGate, QualityIssue};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::triage::types::Post;

// ── Attempt record ──────────────────────────────────────────────────

/// One provider invocation, kept for fallback decisions and audit
/// logging. Never persisted.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub provider: String,
    pub response: Option<String>,
    pub latency: Duration,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
}

/// Result of running the provider chain for one post.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A provider produced an acceptable reply.
    Success {
        text: String,
        provider: String,
        attempts: Vec<GenerationAttempt>,
    },
    /// The chain was exhausted with no acceptable output.
    AllProvidersFailed { attempts: Vec<GenerationAttempt> },
}

// ── Orchestrator ────────────────────────────────────────────────────

/// Runs the ordered provider chain until one yields an acceptable reply.
///
/// Per provider: render the category template, invoke with a bounded
/// timeout, gate the raw output. Any error or gate failure records an
/// attempt and advances the chain — no retry within a provider.
pub struct GenerationOrchestrator {
    providers: Vec<Arc<dyn ReplyProvider>>,
    prompts: PromptLibrary,
    gate: QualityGate,
    call_timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn ReplyProvider>>,
        prompts: PromptLibrary,
        gate: QualityGate,
        call_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            prompts,
            gate,
            call_timeout,
        }
    }

    /// Number of providers in the chain.
    pub fn chain_len(&self) -> usize {
        self.providers.len()
    }

    /// Generate a reply for an accepted post.
    pub async fn generate(&self, post: &Post, category: &str, keywords: &str) -> Outcome {
        let prompt = self.prompts.render(category, post, keywords);
        let mut attempts = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name().to_string();
            let started = Instant::now();

            let result =
                tokio::time::timeout(self.call_timeout, provider.generate(&prompt)).await;
            let latency = started.elapsed();

            let raw = match result {
                Err(_) => {
                    let err = ProviderError::Timeout {
                        provider: name.clone(),
                        timeout: self.call_timeout,
                    };
                    warn!(provider = %name, post_id = %post.id, "Provider timed out");
                    attempts.push(GenerationAttempt {
                        provider: name,
                        response: None,
                        latency,
                        succeeded: false,
                        failure_reason: Some(err.to_string()),
                    });
                    continue;
                }
                Ok(Err(err)) => {
                    warn!(provider = %name, post_id = %post.id, error = %err, "Provider call failed");
                    attempts.push(GenerationAttempt {
                        provider: name,
                        response: None,
                        latency,
                        succeeded: false,
                        failure_reason: Some(err.to_string()),
                    });
                    continue;
                }
                Ok(Ok(text)) => text,
            };

            if let Err(issue) = self.gate.check(&raw) {
                debug!(provider = %name, post_id = %post.id, issue = %issue, "Reply failed quality gate");
                attempts.push(GenerationAttempt {
                    provider: name,
                    response: Some(raw),
                    latency,
                    succeeded: false,
                    failure_reason: Some(issue.to_string()),
                });
                continue;
            }

            info!(
                provider = %name,
                post_id = %post.id,
                latency_ms = latency.as_millis() as u64,
                chars = raw.len(),
                "Generated reply"
            );
            attempts.push(GenerationAttempt {
                provider: name.clone(),
                response: Some(raw.clone()),
                latency,
                succeeded: true,
                failure_reason: None,
            });
            return Outcome::Success {
                text: raw,
                provider: name,
                attempts,
            };
        }

        warn!(
            post_id = %post.id,
            providers = attempts.len(),
            "All providers failed to produce an acceptable reply"
        );
        Outcome::AllProvidersFailed { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    fn make_post() -> Post {
        Post {
            id: "t3_gen".into(),
            source: "india".into(),
            title: "Need career advice".into(),
            body: "Should I switch teams?".into(),
            author: "a".into(),
            score: 5,
            locked: false,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    const GOOD_REPLY: &str =
        "Perhaps talk it over with your manager first; a team switch is easier \
         when everyone knows what you want out of it.";

    /// Provider that returns a fixed response.
    struct FixedProvider {
        name: &'static str,
        response: &'static str,
    }

    #[async_trait]
    impl ReplyProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }
        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.response.to_string())
        }
    }

    /// Provider that always errors.
    struct FailingProvider {
        name: &'static str,
    }

    #[async_trait]
    impl ReplyProvider for FailingProvider {
        fn name(&self) -> &str {
            self.name
        }
        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            Err(ProviderError::RequestFailed {
                provider: self.name.to_string(),
                reason: "boom".into(),
            })
        }
    }

    /// Provider that never completes within any reasonable timeout.
    struct HangingProvider {
        name: &'static str,
    }

    #[async_trait]
    impl ReplyProvider for HangingProvider {
        fn name(&self) -> &str {
            self.name
        }
        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("sleep outlives every test timeout")
        }
    }

    fn orchestrator(providers: Vec<Arc<dyn ReplyProvider>>) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            providers,
            PromptLibrary::builtin(),
            QualityGate::default(),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn first_provider_success_stops_the_chain() {
        let orch = orchestrator(vec![
            Arc::new(FixedProvider {
                name: "a",
                response: GOOD_REPLY,
            }),
            Arc::new(FailingProvider { name: "b" }),
        ]);

        match orch.generate(&make_post(), "helpful_advice", "career").await {
            Outcome::Success {
                provider, attempts, ..
            } => {
                assert_eq!(provider, "a");
                assert_eq!(attempts.len(), 1);
                assert!(attempts[0].succeeded);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_advances_to_fallback() {
        let orch = orchestrator(vec![
            Arc::new(HangingProvider { name: "a" }),
            Arc::new(FixedProvider {
                name: "b",
                response: GOOD_REPLY,
            }),
        ]);

        match orch.generate(&make_post(), "helpful_advice", "career").await {
            Outcome::Success {
                provider, attempts, ..
            } => {
                assert_eq!(provider, "b");
                assert_eq!(attempts.len(), 2);
                assert!(!attempts[0].succeeded);
                assert!(
                    attempts[0]
                        .failure_reason
                        .as_deref()
                        .unwrap()
                        .contains("timed out")
                );
                assert!(attempts[1].succeeded);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn quality_gate_failure_counts_as_provider_failure() {
        let orch = orchestrator(vec![
            Arc::new(FixedProvider {
                name: "a",
                response: "ok",
            }),
            Arc::new(FixedProvider {
                name: "b",
                response: "ty",
            }),
        ]);

        match orch.generate(&make_post(), "general", "career").await {
            Outcome::AllProvidersFailed { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts.iter().all(|a| !a.succeeded));
                assert!(attempts.iter().all(|a| a.failure_reason.is_some()));
            }
            other => panic!("expected all-failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn errors_then_success_records_every_attempt() {
        let orch = orchestrator(vec![
            Arc::new(FailingProvider { name: "a" }),
            Arc::new(FixedProvider {
                name: "b",
                response: "As an AI, I cannot assist with that request at this time.",
            }),
            Arc::new(FixedProvider {
                name: "c",
                response: GOOD_REPLY,
            }),
        ]);

        match orch.generate(&make_post(), "general", "career").await {
            Outcome::Success {
                provider, attempts, ..
            } => {
                assert_eq!(provider, "c");
                assert_eq!(attempts.len(), 3);
                // The refusal reply is kept on the attempt for audit.
                assert!(attempts[1].response.is_some());
                assert!(!attempts[1].succeeded);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_chain_fails_with_no_attempts() {
        let orch = orchestrator(vec![]);
        match orch.generate(&make_post(), "general", "career").await {
            Outcome::AllProvidersFailed { attempts } => assert!(attempts.is_empty()),
            other => panic!("expected all-failed, got {other:?}"),
        }
    }
}
