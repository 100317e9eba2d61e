//! `stance show` - Print a page of a thread as formatted discussion text

use super::page_fetcher;
use anyhow::{bail, Result};
use stance_core::format::format_discussion;
use stance_core::{Config, PageFetcher};

pub async fn run(config: Config, tid: u64, page: u32) -> Result<()> {
    let fetcher = page_fetcher(&config)?;
    let (thread, first) = fetcher.resolve_thread(tid, None).await?;

    if page == 0 || page > thread.total_pages {
        bail!(
            "Page {} is out of range: thread {} has {} pages",
            page,
            tid,
            thread.total_pages
        );
    }

    let data = if page == 1 {
        first
    } else {
        fetcher.fetch_page(tid, page).await?
    };

    println!("📄 Page {}/{}\n", page, thread.total_pages);
    println!("{}", format_discussion(&thread, &data.posts, &data.comments));
    Ok(())
}
