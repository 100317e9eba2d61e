//! Reply generation.
//!
//! Writes a forum reply from a thread's discussion text and its stance
//! summary, in one of the configured personas or from a viewpoint supplied
//! by the user.

use crate::config::{ReplyConfig, ReplyMode};
use crate::format::truncate_chars;
use crate::gemini::{generate_text, GeminiError, TextGenerator};
use crate::prompts::{PromptError, PromptSet, ReplyVars};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Name of the mode that takes its task from the request's viewpoint
pub const CUSTOM_MODE: &str = "custom";

const CUSTOM_ROLE: &str = "You are a regular member of this forum with a clear opinion.";

/// Errors that can occur while generating a reply
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("Unknown reply mode '{mode}' (available: {available})")]
    UnknownMode { mode: String, available: String },

    #[error("The 'custom' reply mode needs a viewpoint")]
    MissingViewpoint,

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Text generation failed: {0}")]
    Service(#[from] GeminiError),
}

/// What to reply to, and how
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// Formatted discussion text (header plus replies)
    pub discussion: String,
    /// Stance summary of the whole thread
    pub summary: String,
    pub mode: String,
    /// Required for the custom mode, ignored otherwise
    pub viewpoint: Option<String>,
}

impl ReplyRequest {
    pub fn new(
        discussion: impl Into<String>,
        summary: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        Self {
            discussion: discussion.into(),
            summary: summary.into(),
            mode: mode.into(),
            viewpoint: None,
        }
    }

    pub fn with_viewpoint(mut self, viewpoint: impl Into<String>) -> Self {
        self.viewpoint = Some(viewpoint.into());
        self
    }
}

/// Pick the persona for a request
pub fn resolve_mode(config: &ReplyConfig, request: &ReplyRequest) -> Result<ReplyMode, ReplyError> {
    if request.mode.eq_ignore_ascii_case(CUSTOM_MODE) {
        let viewpoint = request
            .viewpoint
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ReplyError::MissingViewpoint)?;

        return Ok(ReplyMode {
            name: CUSTOM_MODE.to_string(),
            role: CUSTOM_ROLE.to_string(),
            task: format!(
                "Argue for this viewpoint, in your own words: {}",
                viewpoint
            ),
        });
    }

    config
        .mode(&request.mode)
        .cloned()
        .ok_or_else(|| ReplyError::UnknownMode {
            mode: request.mode.clone(),
            available: config
                .modes
                .iter()
                .map(|m| m.name.as_str())
                .chain([CUSTOM_MODE])
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Generate one reply
#[instrument(skip_all, fields(mode = %request.mode))]
pub async fn generate_reply(
    generator: &dyn TextGenerator,
    model: &str,
    prompts: &PromptSet,
    config: &ReplyConfig,
    max_context_chars: usize,
    request: &ReplyRequest,
) -> Result<String, ReplyError> {
    let mode = resolve_mode(config, request)?;

    let prompt = prompts.render_reply(&ReplyVars {
        role: &mode.role,
        task: &mode.task,
        rules: &config.rules,
        discussion: truncate_chars(&request.discussion, max_context_chars),
        summary: &request.summary,
    })?;
    let model = prompts.reply.model.as_deref().unwrap_or(model);

    debug!("Generating '{}' reply with {}", mode.name, model);
    let reply = generate_text(generator, model, &prompt).await?;
    info!("Generated '{}' reply ({} chars)", mode.name, reply.chars().count());
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::{GeminiRequest, GeminiResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedGenerator {
        text: String,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedGenerator {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, req: &GeminiRequest) -> Result<GeminiResponse, GeminiError> {
            self.prompts.lock().unwrap().push(req.prompt.clone());
            Ok(GeminiResponse {
                text: self.text.clone(),
                model: req.model.clone(),
            })
        }
    }

    async fn reply(
        generator: &FixedGenerator,
        max_context_chars: usize,
        request: &ReplyRequest,
    ) -> Result<String, ReplyError> {
        let prompts = PromptSet::defaults().unwrap();
        generate_reply(
            generator,
            "gemini-2.5-pro",
            &prompts,
            &ReplyConfig::default(),
            max_context_chars,
            request,
        )
        .await
    }

    #[tokio::test]
    async fn test_configured_mode() {
        let generator = FixedGenerator::new("  Totally agree, tea wins.  ");
        let request = ReplyRequest::new("[Title]: Tea?", "Most prefer tea.", "Supporter");

        let text = reply(&generator, 15_000, &request).await.unwrap();

        assert_eq!(text, "Totally agree, tea wins.");
        let prompt = generator.last_prompt();
        assert!(prompt.starts_with("You are a long-time member"));
        assert!(prompt.contains("Most prefer tea."));
        assert!(prompt.contains("- Keep it under 120 words."));
    }

    #[tokio::test]
    async fn test_custom_mode_uses_viewpoint() {
        let generator = FixedGenerator::new("ok");
        let request =
            ReplyRequest::new("d", "s", "custom").with_viewpoint("Coffee is underrated");

        reply(&generator, 15_000, &request).await.unwrap();

        assert!(generator.last_prompt().contains("Coffee is underrated"));
    }

    #[tokio::test]
    async fn test_custom_mode_requires_viewpoint() {
        let generator = FixedGenerator::new("ok");
        let request = ReplyRequest::new("d", "s", "custom").with_viewpoint("   ");

        let err = reply(&generator, 15_000, &request).await.unwrap_err();

        assert!(matches!(err, ReplyError::MissingViewpoint));
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_mode_lists_available() {
        let generator = FixedGenerator::new("ok");
        let err = reply(&generator, 15_000, &ReplyRequest::new("d", "s", "troll"))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("'troll'"));
        assert!(message.contains("supporter, skeptic, mediator, custom"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_error() {
        let generator = FixedGenerator::new("\n");
        let err = reply(&generator, 15_000, &ReplyRequest::new("d", "s", "mediator"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplyError::Service(GeminiError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_discussion_is_truncated() {
        let generator = FixedGenerator::new("ok");
        let discussion = format!("{}{}", "a".repeat(10), "TAIL");

        reply(&generator, 10, &ReplyRequest::new(discussion, "s", "skeptic"))
            .await
            .unwrap();

        let prompt = generator.last_prompt();
        assert!(prompt.contains("[Discussion]\naaaaaaaaaa\n"));
        assert!(!prompt.contains("TAIL"));
    }
}
