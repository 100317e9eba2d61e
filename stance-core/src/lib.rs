//! # Stance Core
//!
//! Core library for Stance - chunked stance summarization of long, paginated
//! forum threads.
//!
//! This crate provides:
//! - Configuration management
//! - Gemini CLI process wrapper
//! - Forum data client and page fetching
//! - Discussion text formatting
//! - The chunk / summarize / reduce analysis pipeline
//! - Prompt templates
//! - SQLite analysis cache
//! - Reply generation
//! - Shared data models

pub mod analysis;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod format;
pub mod forum;
pub mod gemini;
pub mod model;
pub mod prompts;
pub mod reply;

pub use analysis::{plan_chunks, AnalysisError, AnalysisOptions, Analyzer};
pub use cache::{AnalysisCache, CacheError, CachedAnalysis};
pub use config::Config;
pub use fetcher::{ForumPageFetcher, PageFetcher, SeededFetcher};
pub use forum::{ForumApi, ForumError, HttpForumClient, PageData, Thread, ThreadSort};
pub use gemini::{GeminiClient, GeminiError, GeminiRequest, GeminiResponse, TextGenerator};
pub use model::*;
pub use prompts::{PromptError, PromptSet};
pub use reply::{generate_reply, ReplyError, ReplyRequest};
