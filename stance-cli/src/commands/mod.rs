//! CLI command implementations

pub mod analyze;
pub mod cache;
pub mod config;
pub mod prompts;
pub mod reply;
pub mod show;
pub mod threads;

use anyhow::{bail, Result};
use stance_core::{AnalysisCache, Config, ForumPageFetcher, GeminiClient, HttpForumClient};

/// Page fetcher over the configured forum gateway
pub fn page_fetcher(config: &Config) -> Result<ForumPageFetcher<HttpForumClient>> {
    let client = HttpForumClient::from_config(&config.forum)?;
    Ok(ForumPageFetcher::new(client).with_max_comment_posts(config.forum.max_comment_posts))
}

/// Gemini client, after checking the binary can be run
pub async fn gemini_client(config: &Config) -> Result<GeminiClient> {
    let client = GeminiClient::from_config(&config.gemini);
    if !client.check_available().await {
        bail!(
            "Gemini CLI not found at '{}'. Install it or set gemini.binary in the config.",
            config.gemini.binary
        );
    }
    Ok(client)
}

/// The analysis cache, unless disabled by config or `--no-cache`
pub async fn open_cache(config: &Config) -> Result<Option<AnalysisCache>> {
    if !config.cache.enabled {
        return Ok(None);
    }
    Ok(Some(cache_at_default_path().await?))
}

pub async fn cache_at_default_path() -> Result<AnalysisCache> {
    let db_path = Config::default_cache_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine cache path"))?;
    Ok(AnalysisCache::new(&db_path).await?)
}
