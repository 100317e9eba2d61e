//! `stance threads` and `stance search` - Browse a forum

use super::page_fetcher;
use anyhow::Result;
use stance_core::forum::PartialThread;
use stance_core::{Config, ForumApi, ThreadSort};

pub async fn list(config: Config, forum: &str, page: u32, sort: ThreadSort) -> Result<()> {
    let fetcher = page_fetcher(&config)?;
    let threads = fetcher.api().list_threads(forum, page, sort).await?;

    println!("📋 {} - page {} (sorted by {})\n", forum, page, sort);
    print_threads(&threads);
    Ok(())
}

pub async fn search(config: Config, forum: &str, query: &str, page: u32) -> Result<()> {
    let fetcher = page_fetcher(&config)?;
    let threads = fetcher.api().search_threads(forum, query, page).await?;

    println!("🔍 \"{}\" in {} - page {}\n", query, forum, page);
    print_threads(&threads);
    Ok(())
}

fn print_threads(threads: &[PartialThread]) {
    if threads.is_empty() {
        println!("📭 No threads found.");
        return;
    }

    println!("{:<12} {:>7}  {:<16}  TITLE", "TID", "REPLIES", "LAST REPLY");
    println!("{}", "─".repeat(72));

    for thread in threads {
        let replies = thread
            .reply_num
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        let last = thread
            .last_time
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<12} {:>7}  {:<16}  {}",
            thread.tid, replies, last, thread.title
        );
    }

    println!("\n💡 Use 'stance analyze <tid>' to summarize a thread");
}
