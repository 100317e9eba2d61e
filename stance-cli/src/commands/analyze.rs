//! `stance analyze` - Summarize where a whole thread stands

use super::{gemini_client, open_cache, page_fetcher};
use anyhow::{bail, Result};
use stance_core::{
    AnalysisCache, AnalysisOptions, AnalysisReport, AnalysisResult, Analyzer, CachedAnalysis,
    ChunkOutcome, ChunkProgress, Config, PageData, PageFetcher, PromptSet, SeededFetcher, Thread,
};
use tracing::{info, warn};

pub async fn run(
    config: Config,
    tid: u64,
    pages_per_chunk: Option<u32>,
    refresh: bool,
    json: bool,
) -> Result<()> {
    let pages_per_chunk = pages_per_chunk.unwrap_or(config.analysis.pages_per_chunk);
    if pages_per_chunk == 0 {
        bail!("--pages-per-chunk must be at least 1");
    }

    let cache = open_cache(&config).await?;
    if !refresh {
        if let Some(entry) = lookup(cache.as_ref(), tid).await {
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("📦 Cached analysis from {}\n", entry.created_at);
                println!("📖 {}\n", entry.title);
                println!("{}", entry.summary);
                println!("\n💡 Use --refresh to analyze again");
            }
            return Ok(());
        }
    }

    let fetcher = page_fetcher(&config)?;
    let (thread, first) = fetcher.resolve_thread(tid, None).await?;
    if !json {
        println!(
            "📖 {} ({} pages, {} per chunk)\n",
            thread.title, thread.total_pages, pages_per_chunk
        );
    }

    let report = analyze_thread(
        &config,
        &fetcher,
        &thread,
        first,
        pages_per_chunk,
        cache.as_ref(),
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match &report.result {
        AnalysisResult::Success { summary } => {
            let failed = report.failed_chunks().count();
            if failed > 0 {
                println!(
                    "\n⚠️  {} of {} chunks failed and are not covered:",
                    failed,
                    report.outcomes.len()
                );
                for outcome in report.failed_chunks() {
                    if let ChunkOutcome::Failure { message, .. } = outcome {
                        println!("   • {}", message);
                    }
                }
            }
            println!("\n{}", "─".repeat(60));
            println!("{}", summary);
            println!("{}", "─".repeat(60));
            Ok(())
        }
        AnalysisResult::Failure { message } => bail!("Analysis failed: {}", message),
    }
}

/// Cached entry for a thread; cache errors only cost a re-analysis
pub async fn lookup(cache: Option<&AnalysisCache>, tid: u64) -> Option<CachedAnalysis> {
    let cache = cache?;
    match cache.get(tid).await {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Failed to read analysis cache: {}", e);
            None
        }
    }
}

/// Run the chunk pipeline over a resolved thread, printing progress to
/// stderr, and cache the result when it succeeds.
///
/// `first` is the page 1 fetched while resolving the thread; it is reused
/// instead of being downloaded again.
pub async fn analyze_thread(
    config: &Config,
    fetcher: &dyn PageFetcher,
    thread: &Thread,
    first: PageData,
    pages_per_chunk: u32,
    cache: Option<&AnalysisCache>,
) -> Result<AnalysisReport> {
    let client = gemini_client(config).await?;
    let prompts = PromptSet::load()?;
    let options = AnalysisOptions::from_config(config);
    let fetcher = SeededFetcher::new(fetcher).with_page(1, first);
    let analyzer = Analyzer::new(&fetcher, &client, &prompts, options.clone());

    let reporter = |p: ChunkProgress| {
        eprintln!(
            "🔄 [{}/{} {:>3.0}%] Analyzing pages {}-{}...",
            p.chunk_index,
            p.total_chunks,
            p.fraction() * 100.0,
            p.start_page,
            p.end_page
        );
    };

    info!("Analyzing thread {} with {}", thread.tid, options.analyzer_model);
    let report = analyzer
        .analyze_thread(thread, pages_per_chunk, &reporter)
        .await;

    if let Some(cache) = cache {
        if let Err(e) = cache.put(&report, &thread.title, &options).await {
            warn!("Failed to cache analysis: {}", e);
        }
    }

    Ok(report)
}
