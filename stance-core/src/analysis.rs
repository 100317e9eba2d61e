//! Chunked thread analysis.
//!
//! A thread is split into groups of pages. Each group is fetched, rendered to
//! text and summarized on its own; the summaries are then merged with one
//! more call. A chunk that fails is recorded and skipped, so one bad page
//! range never throws away a long run.

use crate::config::Config;
use crate::fetcher::PageFetcher;
use crate::forum::{ForumError, PageData, Thread};
use crate::format::{format_chunk, format_top_post, truncate_chars};
use crate::gemini::{generate_text, GeminiError, TextGenerator};
use crate::model::{
    AnalysisReport, AnalysisResult, ChunkDescriptor, ChunkOutcome, ChunkProgress,
    ProgressReporter,
};
use crate::prompts::{AnalyzerVars, PromptError, PromptSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while analyzing a thread
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to fetch page {page}: {source}")]
    PageFetch {
        page: u32,
        #[source]
        source: ForumError,
    },

    #[error("No posts could be loaded for pages {start_page}-{end_page} (chunk {chunk})")]
    ChunkStructural {
        chunk: usize,
        start_page: u32,
        end_page: u32,
    },

    #[error("Text generation failed: {0}")]
    Service(#[from] GeminiError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("{0}")]
    AllChunksFailed(String),
}

/// Models and limits used by an [`Analyzer`]
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub analyzer_model: String,
    pub summarizer_model: String,
    /// Discussion text cap per analyzer prompt, in characters
    pub max_chunk_chars: usize,
}

impl AnalysisOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            analyzer_model: config.gemini.analyzer_model.clone(),
            summarizer_model: config.gemini.summarizer_model().to_string(),
            max_chunk_chars: config.analysis.max_chunk_chars,
        }
    }
}

/// Split `total_pages` into consecutive groups of at most `pages_per_chunk`.
///
/// Both arguments are treated as at least 1, so the result is never empty.
pub fn plan_chunks(total_pages: u32, pages_per_chunk: u32) -> Vec<ChunkDescriptor> {
    let total = total_pages.max(1);
    let per_chunk = pages_per_chunk.max(1);

    (1..=total)
        .step_by(per_chunk as usize)
        .enumerate()
        .map(|(i, start)| ChunkDescriptor {
            index: i + 1,
            start_page: start,
            end_page: start.saturating_add(per_chunk - 1).min(total),
        })
        .collect()
}

/// What the aggregation step has to do with a set of outcomes
#[derive(Debug, PartialEq, Eq)]
pub enum Reduction<'a> {
    /// Nothing succeeded; carries the first recorded failure
    Failed(String),
    /// Exactly one chunk succeeded; its summary is final
    Single(&'a str),
    /// Several summaries to merge, in chunk order
    Merge(Vec<&'a str>),
}

/// Decide how to aggregate chunk outcomes
pub fn plan_reduction(outcomes: &[ChunkOutcome]) -> Reduction<'_> {
    let summaries: Vec<&str> = outcomes.iter().filter_map(ChunkOutcome::summary).collect();

    match summaries.len() {
        0 => Reduction::Failed(
            outcomes
                .iter()
                .find_map(|o| match o {
                    ChunkOutcome::Failure { message, .. } => Some(message.clone()),
                    ChunkOutcome::Success { .. } => None,
                })
                .unwrap_or_else(|| "No chunks were analyzed".to_string()),
        ),
        1 => Reduction::Single(summaries[0]),
        _ => Reduction::Merge(summaries),
    }
}

/// The top post, rendered once and shared by every chunk of a run
struct ThreadContext {
    thread: Thread,
    header: String,
}

impl ThreadContext {
    fn new(thread: Thread) -> Self {
        let header = format_top_post(&thread);
        Self { thread, header }
    }
}

/// Runs the chunk / summarize / reduce pipeline
pub struct Analyzer<'a> {
    fetcher: &'a dyn PageFetcher,
    generator: &'a dyn TextGenerator,
    prompts: &'a PromptSet,
    options: AnalysisOptions,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        generator: &'a dyn TextGenerator,
        prompts: &'a PromptSet,
        options: AnalysisOptions,
    ) -> Self {
        Self {
            fetcher,
            generator,
            prompts,
            options,
        }
    }

    /// Analyze a thread whose page count is already known.
    ///
    /// The top post is resolved from the first page that carries it.
    pub async fn analyze_by_page(
        &self,
        thread_id: u64,
        total_pages: u32,
        pages_per_chunk: u32,
        reporter: &dyn ProgressReporter,
    ) -> AnalysisResult {
        self.run(thread_id, total_pages, pages_per_chunk, None, reporter)
            .await
            .result
    }

    /// Analyze an already resolved thread, keeping every chunk outcome
    pub async fn analyze_thread(
        &self,
        thread: &Thread,
        pages_per_chunk: u32,
        reporter: &dyn ProgressReporter,
    ) -> AnalysisReport {
        self.run(
            thread.tid,
            thread.total_pages,
            pages_per_chunk,
            Some(ThreadContext::new(thread.clone())),
            reporter,
        )
        .await
    }

    async fn run(
        &self,
        thread_id: u64,
        total_pages: u32,
        pages_per_chunk: u32,
        mut context: Option<ThreadContext>,
        reporter: &dyn ProgressReporter,
    ) -> AnalysisReport {
        let chunks = plan_chunks(total_pages, pages_per_chunk);
        let total_chunks = chunks.len();
        info!(
            "Analyzing thread {}: {} pages in {} chunks of up to {} pages",
            thread_id, total_pages, total_chunks, pages_per_chunk
        );

        let mut outcomes = Vec::with_capacity(total_chunks);
        for chunk in &chunks {
            reporter.report(ChunkProgress {
                chunk_index: chunk.index,
                total_chunks,
                start_page: chunk.start_page,
                end_page: chunk.end_page,
            });

            let outcome = match self
                .summarize_chunk(thread_id, chunk, total_chunks, &mut context)
                .await
            {
                Ok(summary) => {
                    info!("Finished {}", chunk);
                    ChunkOutcome::Success {
                        chunk_index: chunk.index,
                        summary,
                    }
                }
                Err(e) => {
                    warn!("Analysis of {} failed: {}", chunk, e);
                    ChunkOutcome::Failure {
                        chunk_index: chunk.index,
                        message: format!("{}: {}", chunk, e),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let result = self.reduce(&outcomes).await;
        AnalysisReport {
            thread_id,
            result,
            outcomes,
        }
    }

    /// Fetch, render and summarize one chunk
    async fn summarize_chunk(
        &self,
        thread_id: u64,
        chunk: &ChunkDescriptor,
        total_chunks: usize,
        context: &mut Option<ThreadContext>,
    ) -> Result<String, AnalysisError> {
        let pages = self.collect_pages(thread_id, chunk).await?;

        let ctx = match context.take() {
            Some(ctx) => ctx,
            None => self.resolve_header(thread_id, &pages).await,
        };
        let text = format!(
            "{}\n{}",
            ctx.header,
            format_chunk(&ctx.thread, &pages.posts, &pages.comments)
        );
        *context = Some(ctx);
        let discussion = truncate_chars(&text, self.options.max_chunk_chars);
        if discussion.len() < text.len() {
            debug!(
                "Truncated {} from {} to {} characters",
                chunk,
                text.chars().count(),
                self.options.max_chunk_chars
            );
        }

        let prompt = self.prompts.render_analyzer(&AnalyzerVars {
            discussion,
            chunk_index: chunk.index,
            total_chunks,
            start_page: chunk.start_page,
            end_page: chunk.end_page,
        })?;
        let model = self
            .prompts
            .analyzer
            .model
            .as_deref()
            .unwrap_or(&self.options.analyzer_model);

        debug!("Summarizing {} with {} ({} chars)", chunk, model, prompt.len());
        Ok(generate_text(self.generator, model, &prompt).await?)
    }

    /// Find the top post for a run that started without one.
    ///
    /// Tries the chunk's own pages, then page 1 once more, and finally settles
    /// for a title-only header so later chunks still get analyzed.
    async fn resolve_header(&self, thread_id: u64, pages: &PageData) -> ThreadContext {
        let err = match Thread::resolve(thread_id, None, pages) {
            Ok(thread) => return ThreadContext::new(thread),
            Err(e) => e,
        };
        warn!("Chunk pages carry no top post ({}), refetching page 1", err);

        let refetched = match self.fetcher.fetch_page(thread_id, 1).await {
            Ok(first) => Thread::resolve(thread_id, None, &first),
            Err(e) => Err(e),
        };
        match refetched {
            Ok(thread) => ThreadContext::new(thread),
            Err(e) => {
                warn!("Using a placeholder header for thread {}: {}", thread_id, e);
                ThreadContext::new(Thread {
                    tid: thread_id,
                    title: format!("Thread {}", thread_id),
                    contents: Vec::new(),
                    author: Default::default(),
                    total_pages: pages.total_pages.max(1),
                })
            }
        }
    }

    /// Fetch every page of a chunk in ascending order.
    ///
    /// Failed and empty pages are skipped; the chunk only fails when none of
    /// its pages yields a post.
    async fn collect_pages(
        &self,
        thread_id: u64,
        chunk: &ChunkDescriptor,
    ) -> Result<PageData, AnalysisError> {
        let mut merged = PageData::default();

        for page in chunk.pages() {
            let data = match self.fetcher.fetch_page(thread_id, page).await {
                Ok(data) => data,
                Err(source) => {
                    let err = AnalysisError::PageFetch { page, source };
                    warn!("Skipping page: {}", err);
                    continue;
                }
            };

            if data.posts.is_empty() {
                debug!("Page {} of thread {} has no posts, skipping", page, thread_id);
                continue;
            }

            if merged.thread.is_none() {
                merged.thread = data.thread;
                merged.total_pages = data.total_pages;
            }
            merged.posts.extend(data.posts);
            merged.comments.extend(data.comments);
        }

        if merged.posts.is_empty() {
            return Err(AnalysisError::ChunkStructural {
                chunk: chunk.index,
                start_page: chunk.start_page,
                end_page: chunk.end_page,
            });
        }

        Ok(merged)
    }

    /// Turn chunk outcomes into the final result
    async fn reduce(&self, outcomes: &[ChunkOutcome]) -> AnalysisResult {
        match plan_reduction(outcomes) {
            Reduction::Failed(message) => {
                warn!("All {} chunks failed", outcomes.len());
                AnalysisResult::Failure {
                    message: AnalysisError::AllChunksFailed(message).to_string(),
                }
            }
            Reduction::Single(summary) => {
                info!("Only one chunk summary, skipping the merge step");
                AnalysisResult::Success {
                    summary: summary.to_string(),
                }
            }
            Reduction::Merge(summaries) => match self.merge(&summaries).await {
                Ok(summary) => {
                    info!("Merged {} chunk summaries", summaries.len());
                    AnalysisResult::Success { summary }
                }
                Err(e) => {
                    warn!("Merging chunk summaries failed: {}", e);
                    AnalysisResult::Failure {
                        message: format!("Merging {} chunk summaries failed: {}", summaries.len(), e),
                    }
                }
            },
        }
    }

    async fn merge(&self, summaries: &[&str]) -> Result<String, AnalysisError> {
        let prompt = self.prompts.render_summarizer(summaries)?;
        let model = self
            .prompts
            .summarizer
            .model
            .as_deref()
            .unwrap_or(&self.options.summarizer_model);
        Ok(generate_text(self.generator, model, &prompt).await?)
    }
}
