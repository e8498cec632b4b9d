//! Configuration — environment-driven scalars plus the rules file.
//!
//! Rules (keyword + blacklist + template overrides) load once at
//! startup from a JSON file and are immutable for the process lifetime;
//! reload-on-change is an explicit out-of-scope extension point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::generation::ProviderKind;
use crate::triage::matcher::{BlacklistRule, KeywordRule, MatchType, RuleScope};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Sources to watch (e.g. subreddit names).
    pub sources: Vec<String>,
    /// Time between polling cycles.
    pub poll_interval: Duration,
    /// Posts fetched per source per cycle.
    pub fetch_limit: usize,
    /// Posts older than this are skipped without evaluation.
    pub max_post_age_hours: i64,
    /// Maximum replies within the trailing hour.
    pub max_replies_per_hour: u64,
    /// Minimum spacing between consecutive replies.
    pub min_cooldown: Duration,
    /// Posts scoring below this are rejected.
    pub min_post_score: i64,
    /// Ordered generation fallback chain.
    pub provider_chain: Vec<ProviderKind>,
    /// Per-provider call timeout.
    pub provider_timeout: Duration,
    /// Output token cap per generation call.
    pub reply_max_tokens: u64,
    /// SQLite database location.
    pub db_path: PathBuf,
    /// Optional rules file; built-in defaults when unset.
    pub rules_path: Option<PathBuf>,
    /// Audit log retention.
    pub audit_keep_days: u32,
    /// Processed-set retention.
    pub processed_keep_days: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            sources: vec!["india".to_string(), "AskReddit".to_string()],
            poll_interval: Duration::from_secs(60 * 60),
            fetch_limit: 25,
            max_post_age_hours: 24,
            max_replies_per_hour: 3,
            min_cooldown: Duration::from_secs(600),
            min_post_score: 0,
            provider_chain: vec![
                ProviderKind::Gemini,
                ProviderKind::Anthropic,
                ProviderKind::OpenAi,
            ],
            provider_timeout: Duration::from_secs(30),
            reply_max_tokens: 500,
            db_path: PathBuf::from("./data/reply-pilot.db"),
            rules_path: None,
            audit_keep_days: 30,
            processed_keep_days: 90,
        }
    }
}

impl BotConfig {
    /// Build config from environment variables, falling back to
    /// defaults for anything unset. A present-but-unparseable provider
    /// chain is a hard error; numeric variables fall back silently.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let sources = std::env::var("SUBREDDITS")
            .map(|s| parse_source_list(&s))
            .unwrap_or(defaults.sources);

        let poll_interval = env_u64("CHECK_INTERVAL_MINUTES")
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(defaults.poll_interval);

        let provider_chain = match std::env::var("PROVIDER_CHAIN") {
            Ok(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(ProviderKind::parse)
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => defaults.provider_chain,
        };

        Ok(Self {
            sources,
            poll_interval,
            fetch_limit: env_u64("FETCH_LIMIT")
                .map(|v| v as usize)
                .unwrap_or(defaults.fetch_limit),
            max_post_age_hours: env_u64("MAX_POST_AGE_HOURS")
                .map(|v| v as i64)
                .unwrap_or(defaults.max_post_age_hours),
            max_replies_per_hour: env_u64("MAX_REPLIES_PER_HOUR")
                .unwrap_or(defaults.max_replies_per_hour),
            min_cooldown: env_u64("MIN_COOLDOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.min_cooldown),
            min_post_score: std::env::var("MIN_POST_SCORE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_post_score),
            provider_chain,
            provider_timeout: env_u64("PROVIDER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            reply_max_tokens: env_u64("REPLY_MAX_TOKENS").unwrap_or(defaults.reply_max_tokens),
            db_path: std::env::var("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            rules_path: std::env::var("RULES_PATH").ok().map(PathBuf::from),
            audit_keep_days: env_u64("AUDIT_KEEP_DAYS")
                .map(|v| v as u32)
                .unwrap_or(defaults.audit_keep_days),
            processed_keep_days: env_u64("PROCESSED_KEEP_DAYS")
                .map(|v| v as u32)
                .unwrap_or(defaults.processed_keep_days),
        })
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Parse a comma-separated source list, dropping any `r/` prefix.
pub fn parse_source_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .map(|s| s.strip_prefix("r/").unwrap_or(s))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Rules file ──────────────────────────────────────────────────────

/// Keyword/blacklist rules plus optional template overrides, as loaded
/// from the rules file.
#[derive(Debug, Clone, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub keywords: Vec<KeywordRule>,
    #[serde(default)]
    pub blacklist: Vec<BlacklistRule>,
    #[serde(default)]
    pub templates: HashMap<String, String>,
}

/// Load the rules file, or the built-in defaults when no path is set.
pub fn load_rules(path: Option<&std::path::Path>) -> Result<RulesFile, ConfigError> {
    let Some(path) = path else {
        return Ok(default_rules());
    };

    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::RulesFileRead {
        path: path.display().to_string(),
        source: e,
    })?;

    serde_json::from_str(&raw).map_err(|e| ConfigError::RulesFileParse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Built-in rule set used when no rules file is configured.
pub fn default_rules() -> RulesFile {
    fn keyword(pattern: &str, priority: u32, category: &str) -> KeywordRule {
        KeywordRule {
            pattern: pattern.to_string(),
            match_type: MatchType::Partial,
            scope: RuleScope::Both,
            priority,
            category: category.to_string(),
        }
    }

    fn blocked(pattern: &str) -> BlacklistRule {
        BlacklistRule {
            pattern: pattern.to_string(),
            match_type: MatchType::Partial,
            scope: RuleScope::Both,
        }
    }

    let keywords = [
        ("india", 3),
        ("indian", 3),
        ("delhi", 3),
        ("mumbai", 3),
        ("bangalore", 3),
        ("bollywood", 3),
        ("cricket", 3),
        ("diwali", 3),
        ("monsoon", 3),
    ]
    .into_iter()
    .map(|(p, prio)| keyword(p, prio, "india_specific"))
    .chain(
        [
            "advice",
            "need help",
            "suggestion",
            "recommend",
            "what should i",
            "how do i",
            "career",
            "interview",
            "salary",
            "relationship",
        ]
        .into_iter()
        .map(|p| keyword(p, 2, "helpful_advice")),
    )
    .chain(
        [
            "programming",
            "coding",
            "developer",
            "software",
            "python",
            "javascript",
            "machine learning",
            "startup",
            "database",
        ]
        .into_iter()
        .map(|p| keyword(p, 2, "tech_discussion")),
    )
    .collect();

    let blacklist = [
        "suicide",
        "self harm",
        "drugs",
        "illegal",
        "porn",
        "nsfw",
        "hate",
        "violence",
        "terrorist",
    ]
    .into_iter()
    .map(blocked)
    .collect();

    RulesFile {
        keywords,
        blacklist,
        templates: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn source_list_strips_prefixes_and_whitespace() {
        let sources = parse_source_list(" r/india , AskReddit ,, r/developersIndia ");
        assert_eq!(sources, vec!["india", "AskReddit", "developersIndia"]);
    }

    #[test]
    fn default_rules_compile() {
        use crate::triage::matcher::{Blacklist, MatchEngine};

        let rules = default_rules();
        assert!(!rules.keywords.is_empty());
        assert!(!rules.blacklist.is_empty());
        MatchEngine::compile(&rules.keywords).unwrap();
        Blacklist::compile(&rules.blacklist).unwrap();
    }

    #[test]
    fn rules_file_parses() {
        let json = r#"{
            "keywords": [
                {"pattern": "mumbai", "match_type": "partial", "scope": "both",
                 "priority": 3, "category": "india_specific"},
                {"pattern": "how do i\\b", "match_type": "regex", "scope": "title",
                 "priority": 2, "category": "helpful_advice"}
            ],
            "blacklist": [
                {"pattern": "nsfw", "match_type": "exact", "scope": "both"}
            ],
            "templates": {"india_specific": "Custom {title}"}
        }"#;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let rules = load_rules(Some(file.path())).unwrap();
        assert_eq!(rules.keywords.len(), 2);
        assert_eq!(rules.keywords[0].pattern, "mumbai");
        assert_eq!(rules.keywords[1].match_type, MatchType::Regex);
        assert_eq!(rules.blacklist.len(), 1);
        assert_eq!(rules.templates["india_specific"], "Custom {title}");
    }

    #[test]
    fn missing_rules_file_is_a_config_error() {
        let err = load_rules(Some(std::path::Path::new("/no/such/rules.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::RulesFileRead { .. }));
    }

    #[test]
    fn malformed_rules_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        let err = load_rules(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::RulesFileParse { .. }));
    }

    #[test]
    fn defaults_are_sane() {
        let config = BotConfig::default();
        assert_eq!(config.max_replies_per_hour, 3);
        assert_eq!(config.min_cooldown, Duration::from_secs(600));
        assert_eq!(config.provider_chain.len(), 3);
        assert_eq!(config.provider_chain[0], ProviderKind::Gemini);
    }
}
