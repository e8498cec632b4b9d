//! Keyword match engine.
//!
//! Rules are compiled once at startup; a malformed regex is a
//! configuration error at load time, never a match-time error.
//! Evaluation is pure: the winning rule is the highest-priority match,
//! ties broken by configured order.

use regex::{Regex, RegexBuilder, escape};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::triage::types::{MatchVerdict, Post};

// ── Rule records ────────────────────────────────────────────────────

/// How a rule's pattern is tested against the scoped text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Whole-token match on word boundaries ("go" does not match "going").
    Exact,
    /// Case-insensitive substring anywhere in the scoped text.
    Partial,
    /// Regular expression, compiled case-insensitive at load time.
    Regex,
}

/// Which post field a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Title,
    Body,
    Both,
}

/// A keyword rule as loaded from configuration. Immutable once compiled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub pattern: String,
    pub match_type: MatchType,
    pub scope: RuleScope,
    /// Higher wins; ties go to the earlier rule in configured order.
    pub priority: u32,
    /// Selects the response template for generation.
    pub category: String,
}

/// A suppression rule — any match rejects the post unconditionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistRule {
    pub pattern: String,
    pub match_type: MatchType,
    pub scope: RuleScope,
}

// ── Compiled form ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum CompiledPattern {
    /// Word-boundary regex built from the escaped pattern.
    Exact(Regex),
    /// Lowercased pattern for substring search.
    Partial(String),
    Regex(Regex),
}

impl CompiledPattern {
    fn compile(pattern: &str, match_type: MatchType) -> Result<Self, ConfigError> {
        match match_type {
            MatchType::Exact => {
                let source = format!(r"\b{}\b", escape(pattern));
                let re = RegexBuilder::new(&source)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::InvalidRule {
                        pattern: pattern.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Self::Exact(re))
            }
            MatchType::Partial => Ok(Self::Partial(pattern.to_lowercase())),
            MatchType::Regex => {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::InvalidRule {
                        pattern: pattern.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Self::Regex(re))
            }
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Exact(re) | Self::Regex(re) => re.is_match(text),
            Self::Partial(needle) => text.to_lowercase().contains(needle),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: String,
    compiled: CompiledPattern,
    scope: RuleScope,
    priority: u32,
    category: String,
}

/// Test a compiled pattern against the post fields its scope designates.
fn scope_match(compiled: &CompiledPattern, scope: RuleScope, post: &Post) -> bool {
    match scope {
        RuleScope::Title => compiled.is_match(&post.title),
        RuleScope::Body => compiled.is_match(&post.body),
        RuleScope::Both => {
            compiled.is_match(&post.title) || compiled.is_match(&post.body)
        }
    }
}

// ── Match engine ────────────────────────────────────────────────────

/// Scores posts against the compiled keyword rule set.
pub struct MatchEngine {
    rules: Vec<CompiledRule>,
}

impl MatchEngine {
    /// Compile the configured rules. Fails on the first malformed pattern.
    pub fn compile(rules: &[KeywordRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|r| {
                Ok(CompiledRule {
                    pattern: r.pattern.clone(),
                    compiled: CompiledPattern::compile(&r.pattern, r.match_type)?,
                    scope: r.scope,
                    priority: r.priority,
                    category: r.category.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { rules })
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate a post against all rules.
    ///
    /// Returns the highest-priority match; on equal priority the earlier
    /// rule in configured order wins. No side effects.
    pub fn evaluate(&self, post: &Post) -> MatchVerdict {
        let mut best: Option<&CompiledRule> = None;

        for rule in &self.rules {
            if !scope_match(&rule.compiled, rule.scope, post) {
                continue;
            }
            // Strictly-greater keeps the first match on priority ties.
            if best.is_none_or(|b| rule.priority > b.priority) {
                best = Some(rule);
            }
        }

        match best {
            Some(rule) => {
                debug!(
                    post_id = %post.id,
                    pattern = %rule.pattern,
                    category = %rule.category,
                    priority = rule.priority,
                    "Keyword rule matched"
                );
                MatchVerdict {
                    matched: true,
                    category: Some(rule.category.clone()),
                    priority: rule.priority,
                    pattern: Some(rule.pattern.clone()),
                }
            }
            None => MatchVerdict::none(),
        }
    }
}

// ── Blacklist ───────────────────────────────────────────────────────

/// Compiled suppression rules, shared matching semantics with keyword rules.
pub struct Blacklist {
    rules: Vec<(String, CompiledPattern, RuleScope)>,
}

impl Blacklist {
    /// Compile the configured blacklist rules.
    pub fn compile(rules: &[BlacklistRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|r| {
                Ok((
                    r.pattern.clone(),
                    CompiledPattern::compile(&r.pattern, r.match_type)?,
                    r.scope,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { rules })
    }

    /// An empty blacklist (for tests and rule-less configs).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Returns the first matching pattern, if any.
    pub fn hit(&self, post: &Post) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, compiled, scope)| scope_match(compiled, *scope, post))
            .map(|(pattern, _, _)| pattern.as_str())
    }
}
