use std::sync::Arc;

use anyhow::Context;
use secrecy::SecretString;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use reply_pilot::config::{BotConfig, load_rules};
use reply_pilot::engine::{Bot, PostProcessor};
use reply_pilot::generation::{
    GenerationOrchestrator, PromptLibrary, QualityGate, ReplyProvider, TemplateOverrides,
    create_provider,
};
use reply_pilot::ledger::{CooldownLedger, CooldownPolicy};
use reply_pilot::platform::{Platform, RedditConfig, RedditPlatform};
use reply_pilot::store::{Database, LibSqlBackend};
use reply_pilot::triage::{Blacklist, MatchEngine, PolicyGate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Tracing: stdout plus a daily-rotated file log
    let file_appender = tracing_appender::rolling::daily("logs", "reply-pilot.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    let config = BotConfig::from_env().context("Invalid configuration")?;

    eprintln!("reply-pilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Sources: {}", config.sources.join(", "));
    eprintln!(
        "   Cycle: every {} min, limit {} posts/source",
        config.poll_interval.as_secs() / 60,
        config.fetch_limit
    );
    eprintln!(
        "   Rate limits: {}/hour, {}s cooldown",
        config.max_replies_per_hour,
        config.min_cooldown.as_secs()
    );

    // ── Rules ───────────────────────────────────────────────────────
    let rules = load_rules(config.rules_path.as_deref()).context("Failed to load rules")?;
    let matcher = MatchEngine::compile(&rules.keywords).context("Invalid keyword rules")?;
    let blacklist = Blacklist::compile(&rules.blacklist).context("Invalid blacklist rules")?;
    eprintln!(
        "   Rules: {} keyword, {} blacklist{}",
        rules.keywords.len(),
        rules.blacklist.len(),
        config
            .rules_path
            .as_ref()
            .map(|p| format!(" (from {})", p.display()))
            .unwrap_or_else(|| " (built-in)".to_string())
    );

    let prompts = PromptLibrary::with_overrides(TemplateOverrides {
        templates: rules.templates.clone(),
    });

    // ── Database ────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Providers ───────────────────────────────────────────────────
    let mut providers: Vec<Arc<dyn ReplyProvider>> = Vec::new();
    for kind in &config.provider_chain {
        let Ok(key) = std::env::var(kind.api_key_var()) else {
            tracing::warn!(provider = kind.as_str(), "No API key set, skipping provider");
            continue;
        };
        if key.is_empty() {
            continue;
        }

        let model = std::env::var(format!("{}_MODEL", kind.as_str().to_uppercase()))
            .unwrap_or_else(|_| kind.default_model().to_string());

        match create_provider(*kind, SecretString::from(key), &model, config.reply_max_tokens) {
            Ok(provider) => providers.push(provider),
            Err(e) => tracing::warn!(provider = kind.as_str(), error = %e, "Provider setup failed"),
        }
    }
    if providers.is_empty() {
        return Err(reply_pilot::error::ConfigError::NoProviders.into());
    }
    eprintln!(
        "   Providers: {}",
        providers
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(" → ")
    );

    let orchestrator = GenerationOrchestrator::new(
        providers,
        prompts,
        QualityGate::default(),
        config.provider_timeout,
    );

    // ── Platform ────────────────────────────────────────────────────
    let reddit_config = RedditConfig::from_env().ok_or_else(|| {
        reply_pilot::error::ConfigError::MissingEnvVar("REDDIT_CLIENT_ID".into())
    })?;
    let platform: Arc<dyn Platform> = Arc::new(RedditPlatform::new(reddit_config));
    eprintln!("   Platform: {}\n", platform.name());

    // ── Engine ──────────────────────────────────────────────────────
    let ledger = CooldownLedger::new(
        Arc::clone(&db),
        CooldownPolicy {
            max_replies_per_hour: config.max_replies_per_hour,
            min_cooldown: config.min_cooldown,
        },
    );
    let policy = PolicyGate::new(blacklist, config.min_post_score);

    let processor = PostProcessor::new(
        matcher,
        policy,
        ledger,
        orchestrator,
        Arc::clone(&platform),
        Arc::clone(&db),
    );

    let bot = Bot::new(processor, platform, db, config);
    bot.run().await?;

    Ok(())
}
