//! Output quality gate.
//!
//! Applied to each provider's raw output before accepting it. A failed
//! check counts as that provider's failure and the chain advances.

/// Refusal/boilerplate markers that make a reply unusable as-is.
const REFUSAL_MARKERS: &[&str] = &[
    "as an ai",
    "as a language model",
    "i cannot assist",
    "i can't assist",
    "i'm sorry, but i",
    "i am unable to",
    "i'm unable to",
];

/// Phrases typical of spam replies.
const SPAM_PHRASES: &[&str] = &[
    "click here",
    "buy now",
    "limited time",
    "act now",
    "free money",
    "get rich",
    "make money fast",
    "dm me",
];

/// Why a generated reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QualityIssue {
    #[error("reply too short ({len} chars, minimum {min})")]
    TooShort { len: usize, min: usize },

    #[error("reply too long ({len} chars, maximum {max})")]
    TooLong { len: usize, max: usize },

    #[error("reply contains refusal boilerplate: '{0}'")]
    RefusalMarker(String),

    #[error("reply looks like spam: {0}")]
    SpamLike(String),
}

/// Length bounds and content heuristics for generated replies.
#[derive(Debug, Clone)]
pub struct QualityGate {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_len: 30,
            max_len: 2000,
        }
    }
}

impl QualityGate {
    /// Accept or reject a candidate reply.
    pub fn check(&self, text: &str) -> Result<(), QualityIssue> {
        let trimmed = text.trim();
        let len = trimmed.chars().count();

        if len < self.min_len {
            return Err(QualityIssue::TooShort {
                len,
                min: self.min_len,
            });
        }
        if len > self.max_len {
            return Err(QualityIssue::TooLong {
                len,
                max: self.max_len,
            });
        }

        let lower = trimmed.to_lowercase();
        if let Some(marker) = REFUSAL_MARKERS.iter().find(|m| lower.contains(**m)) {
            return Err(QualityIssue::RefusalMarker((*marker).to_string()));
        }

        if let Some(reason) = spam_reason(trimmed, &lower) {
            return Err(QualityIssue::SpamLike(reason));
        }

        Ok(())
    }
}

/// Spam heuristics: shouting, punctuation walls, known spam phrases.
fn spam_reason(text: &str, lower: &str) -> Option<String> {
    let total = text.chars().count();
    if total > 10 {
        let caps = text.chars().filter(|c| c.is_uppercase()).count();
        if caps * 2 > total {
            return Some("excessive capitalization".into());
        }
    }

    let punct = text.chars().filter(|c| "!?.,;:".contains(*c)).count();
    if total > 0 && punct * 10 > total * 3 {
        return Some("excessive punctuation".into());
    }

    SPAM_PHRASES
        .iter()
        .find(|p| lower.contains(**p))
        .map(|p| format!("spam phrase '{p}'"))
}
