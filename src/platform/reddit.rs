//! Reddit adapter — OAuth password-grant client over the public API.
//!
//! Fetches `/new` listings and submits comments. Tokens are cached and
//! refreshed on expiry. Retry/backoff for the platform API is out of
//! scope — a failed call surfaces as `PlatformError` and the engine
//! reconsiders the post next cycle.

use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::PlatformError;
use crate::platform::Platform;
use crate::triage::types::Post;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

/// Token lifetime safety margin — refresh a minute early.
const TOKEN_SLACK_SECS: i64 = 60;

// ── Configuration ───────────────────────────────────────────────────

/// Reddit credentials, built from environment variables.
#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub username: String,
    pub password: SecretString,
    pub user_agent: String,
}

impl RedditConfig {
    /// Build config from environment variables.
    /// Returns `None` if `REDDIT_CLIENT_ID` is not set.
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("REDDIT_CLIENT_ID").ok()?;

        Some(Self {
            client_id,
            client_secret: SecretString::from(
                std::env::var("REDDIT_CLIENT_SECRET").unwrap_or_default(),
            ),
            username: std::env::var("REDDIT_USERNAME").unwrap_or_default(),
            password: SecretString::from(std::env::var("REDDIT_PASSWORD").unwrap_or_default()),
            user_agent: std::env::var("REDDIT_USER_AGENT")
                .unwrap_or_else(|_| "reply-pilot/0.1".to_string()),
        })
    }
}

// ── Adapter ─────────────────────────────────────────────────────────

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Reddit API platform adapter.
pub struct RedditPlatform {
    http: reqwest::Client,
    config: RedditConfig,
    token: Mutex<Option<CachedToken>>,
}

impl RedditPlatform {
    pub fn new(config: RedditConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    /// Return a valid access token, fetching a fresh one when needed.
    async fn access_token(&self) -> Result<String, PlatformError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at - chrono::Duration::seconds(TOKEN_SLACK_SECS) > Utc::now()
        {
            return Ok(token.access_token.clone());
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .form(&[
                ("grant_type", "password"),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::AuthFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::AuthFailed {
                reason: format!("token endpoint returned {status}: {body}"),
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| PlatformError::AuthFailed {
                    reason: format!("unparseable token response: {e}"),
                })?;

        if token.access_token.is_empty() {
            return Err(PlatformError::AuthFailed {
                reason: "token response carried no access_token".into(),
            });
        }

        info!(username = %self.config.username, "Authenticated with Reddit");
        let access = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        });
        Ok(access)
    }
}

#[async_trait::async_trait]
impl Platform for RedditPlatform {
    fn name(&self) -> &str {
        "reddit"
    }

    async fn fetch_new(&self, source: &str, limit: usize) -> Result<Vec<Post>, PlatformError> {
        let token = self.access_token().await?;
        let url = format!("{API_BASE}/r/{source}/new?limit={limit}&raw_json=1");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(|e| PlatformError::RequestFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::UnexpectedResponse { status, body });
        }

        let listing: Listing =
            response
                .json()
                .await
                .map_err(|e| PlatformError::RequestFailed {
                    reason: format!("unparseable listing: {e}"),
                })?;

        let posts: Vec<Post> = listing
            .data
            .children
            .into_iter()
            .map(|child| map_post(child.data, source))
            .collect();

        debug!(source = %source, count = posts.len(), "Fetched new posts");
        Ok(posts)
    }

    async fn submit(&self, post_id: &str, text: &str) -> Result<(), PlatformError> {
        let token = self.access_token().await?;
        let thing_id = format!("t3_{post_id}");

        let response = self
            .http
            .post(format!("{API_BASE}/api/comment"))
            .bearer_auth(&token)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .form(&[
                ("api_type", "json"),
                ("thing_id", thing_id.as_str()),
                ("text", text),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::RequestFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::UnexpectedResponse { status, body });
        }

        let result: CommentResponse =
            response
                .json()
                .await
                .map_err(|e| PlatformError::RequestFailed {
                    reason: format!("unparseable comment response: {e}"),
                })?;

        if let Some(error) = result.json.errors.first() {
            // Errors arrive as [code, message, field] triples.
            let reason = error
                .iter()
                .map(|v| v.as_str().unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" ");
            return Err(PlatformError::SubmitRejected {
                post_id: post_id.to_string(),
                reason,
            });
        }

        info!(post_id = %post_id, "Reply submitted");
        Ok(())
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: i64,
}

fn default_expiry() -> i64 {
    3600
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: RawPost,
}

#[derive(Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    removed_by_category: Option<String>,
    #[serde(default)]
    created_utc: f64,
}

fn map_post(raw: RawPost, source: &str) -> Post {
    let deleted = raw.author == "[deleted]" || raw.removed_by_category.is_some();
    let created_at = Utc
        .timestamp_opt(raw.created_utc as i64, 0)
        .single()
        .unwrap_or_else(Utc::now);

    Post {
        id: raw.id,
        source: source.to_string(),
        title: raw.title,
        body: raw.selftext,
        author: raw.author,
        score: raw.score,
        locked: raw.locked,
        deleted,
        created_at,
    }
}

#[derive(Deserialize)]
struct CommentResponse {
    json: CommentJson,
}

#[derive(Deserialize)]
struct CommentJson {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
}
