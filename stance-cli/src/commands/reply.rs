//! `stance reply` - Draft a reply that fits where the thread stands

use super::analyze::{analyze_thread, lookup};
use super::{gemini_client, open_cache, page_fetcher};
use anyhow::{bail, Result};
use stance_core::format::format_discussion;
use stance_core::{generate_reply, AnalysisResult, Config, PageFetcher, PromptSet, ReplyRequest};

pub async fn run(
    config: Config,
    tid: u64,
    mode: String,
    viewpoint: Option<String>,
    page: u32,
) -> Result<()> {
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

    let cache = open_cache(&config).await?;
    let summary = match lookup(cache.as_ref(), tid).await {
        Some(entry) => {
            println!("📦 Using cached analysis from {}", entry.created_at);
            entry.summary
        }
        None => {
            println!("🔍 No cached analysis, analyzing \"{}\" first\n", thread.title);
            let report = analyze_thread(
                &config,
                &fetcher,
                &thread,
                first.clone(),
                config.analysis.pages_per_chunk,
                cache.as_ref(),
            )
            .await?;
            match report.result {
                AnalysisResult::Success { summary } => summary,
                AnalysisResult::Failure { message } => bail!("Analysis failed: {}", message),
            }
        }
    };

    let data = if page == 1 {
        first
    } else {
        fetcher.fetch_page(tid, page).await?
    };
    let discussion = format_discussion(&thread, &data.posts, &data.comments);

    let mut request = ReplyRequest::new(discussion, summary, mode);
    if let Some(viewpoint) = viewpoint {
        request = request.with_viewpoint(viewpoint);
    }

    let client = gemini_client(&config).await?;
    let prompts = PromptSet::load()?;

    println!("✍️  Writing a '{}' reply...\n", request.mode);
    let reply = generate_reply(
        &client,
        &config.gemini.generator_model,
        &prompts,
        &config.reply,
        config.analysis.max_reply_context_chars,
        &request,
    )
    .await?;

    println!("{}", "─".repeat(60));
    println!("{}", reply);
    println!("{}", "─".repeat(60));
    Ok(())
}
