//! Gemini CLI wrapper.
//!
//! This module provides an async interface to the official `gemini` CLI,
//! handling process spawning, stdout piping, and error parsing. The
//! [`TextGenerator`] trait is the seam the analysis pipeline talks to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Errors that can occur when interacting with the Gemini CLI
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Gemini binary not found at '{0}'. Please ensure the gemini CLI is installed and accessible.")]
    BinaryNotFound(String),

    #[error("Failed to spawn Gemini process: {0}")]
    SpawnError(#[from] std::io::Error),

    #[error("Gemini process failed with exit code {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    #[error("Gemini returned no text (the response may have been blocked by safety filters)")]
    EmptyResponse,

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
}

/// Request to send to Gemini
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiRequest {
    /// The model to use (e.g., "gemini-2.5-pro")
    pub model: String,

    /// The prompt to send
    pub prompt: String,
}

impl GeminiRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
        }
    }
}

/// Plain-text response from Gemini
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiResponse {
    /// Extracted text content
    pub text: String,

    /// Model used
    pub model: String,
}

/// A text-generation backend.
///
/// Implementations must return within their own timeout; callers never retry.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GeminiRequest) -> Result<GeminiResponse, GeminiError>;
}

/// Run a plain-text generation and treat blank output as a failure.
pub async fn generate_text(
    generator: &dyn TextGenerator,
    model: &str,
    prompt: &str,
) -> Result<String, GeminiError> {
    let request = GeminiRequest::new(model, prompt);
    let response = generator.generate(&request).await?;
    let text = response.text.trim();
    if text.is_empty() {
        return Err(GeminiError::EmptyResponse);
    }
    Ok(text.to_string())
}

/// Client for interacting with the Gemini CLI
pub struct GeminiClient {
    /// Path to the gemini binary
    binary_path: PathBuf,

    /// Default system prompt
    default_system_prompt: Option<String>,

    /// Timeout in seconds (0 = no timeout)
    timeout_secs: u64,
}

impl GeminiClient {
    /// Create a new GeminiClient
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            default_system_prompt: None,
            timeout_secs: 300, // 5 minutes default
        }
    }

    /// Build a client from the `[gemini]` config section
    pub fn from_config(config: &crate::config::GeminiConfig) -> Self {
        let mut client = Self::new(&config.binary).with_timeout(config.timeout_secs);
        if let Some(system) = &config.system_prompt {
            client = client.with_system_prompt(system);
        }
        client
    }

    /// Set the default system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_system_prompt = Some(prompt.into());
        self
    }

    /// Set the timeout in seconds
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Check if the gemini binary is available
    pub async fn check_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Call Gemini with a prompt
    #[instrument(skip(self, req), fields(model = %req.model, prompt_len = req.prompt.len()))]
    pub async fn call(&self, req: &GeminiRequest) -> Result<GeminiResponse, GeminiError> {
        let prompt = self.build_prompt(req);

        debug!("Calling Gemini CLI with model: {}", req.model);

        let mut cmd = Command::new(&self.binary_path);

        // Non-interactive mode
        cmd.arg("-p").arg(&prompt);
        cmd.arg("-m").arg(&req.model);

        // The CLI wraps its answer in a JSON envelope
        cmd.arg("--output-format").arg("json");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(self.timeout_secs),
                cmd.output(),
            )
            .await
            .map_err(|_| GeminiError::Timeout(self.timeout_secs))??
        } else {
            cmd.output().await?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!("Gemini CLI exit code: {:?}", output.status.code());

        if !output.status.success() {
            return Err(classify_failure(output.status.code().unwrap_or(-1), stderr));
        }

        Ok(parse_response(&stdout, &req.model))
    }

    /// Build the full prompt including the configured system prompt
    fn build_prompt(&self, req: &GeminiRequest) -> String {
        match &self.default_system_prompt {
            Some(sys) => format!("{}\n\n{}", sys, req.prompt),
            None => req.prompt.clone(),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: &GeminiRequest) -> Result<GeminiResponse, GeminiError> {
        self.call(request).await
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new("gemini")
    }
}

/// Map a non-zero exit into the most specific error we can tell apart
fn classify_failure(exit_code: i32, stderr: String) -> GeminiError {
    let lower = stderr.to_lowercase();
    if lower.contains("authentication") || lower.contains("auth") || lower.contains("login") {
        return GeminiError::AuthenticationError(stderr);
    }
    if lower.contains("rate limit") || lower.contains("quota") || lower.contains("429") {
        return GeminiError::RateLimitError(stderr);
    }
    GeminiError::ProcessFailed { exit_code, stderr }
}

/// Parse the stdout of the Gemini CLI
fn parse_response(output: &str, model: &str) -> GeminiResponse {
    let trimmed = output.trim();

    // We request --output-format json, but older CLIs print plain text
    let text = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(envelope) => extract_text_from_envelope(&envelope),
        Err(_) => trimmed.to_string(),
    };

    GeminiResponse {
        text,
        model: model.to_string(),
    }
}

/// Extract text content from Gemini CLI JSON output
fn extract_text_from_envelope(value: &serde_json::Value) -> String {
    for key in ["response", "text", "content", "output"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            return text.to_string();
        }
    }

    if let Some(text) = value.as_str() {
        return text.to_string();
    }

    // An envelope with an explicit null response carries no text
    if value.get("response").is_some_and(|v| v.is_null()) {
        return String::new();
    }

    value.to_string()
}
