//! Platform abstraction — post fetching and reply submission.
//!
//! Adapters are pure I/O: they map a platform's native payload into
//! `Post` and submit approved replies. Triage, rate limiting, and
//! generation live in the engine.

pub mod reddit;

pub use reddit::{RedditConfig, RedditPlatform};

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::triage::types::Post;

/// A social platform the engine watches and replies on.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Platform name (e.g. "reddit").
    fn name(&self) -> &str;

    /// Fetch the newest posts from one source (e.g. a subreddit).
    async fn fetch_new(&self, source: &str, limit: usize) -> Result<Vec<Post>, PlatformError>;

    /// Submit a reply to a post.
    ///
    /// Called only after generation succeeds; on failure the engine
    /// must leave the cooldown ledger and processed set untouched.
    async fn submit(&self, post_id: &str, text: &str) -> Result<(), PlatformError>;
}
