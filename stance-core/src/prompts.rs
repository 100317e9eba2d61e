//! Prompt templates.
//!
//! Each prompt is a `.prompt.md` file with YAML frontmatter and a Tera body.
//! The pipeline receives a loaded [`PromptSet`] by reference and never reads
//! templates from disk itself.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during template operations
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to read template file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse template frontmatter: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Template rendering error: {0}")]
    RenderError(#[from] tera::Error),

    #[error("Invalid template format: {0}")]
    InvalidFormat(String),
}

/// A prompt template with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name (unique identifier)
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Model override (optional, the configured model is used otherwise)
    #[serde(default)]
    pub model: Option<String>,
    /// The template body (Tera syntax)
    #[serde(skip)]
    pub body: String,
    /// Source file path
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl PromptTemplate {
    /// Parse a template from a .prompt.md file
    pub fn from_file(path: &Path) -> Result<Self, PromptError> {
        let content = std::fs::read_to_string(path)?;
        let mut template = Self::parse(&content)?;
        template.source_path = Some(path.to_path_buf());
        Ok(template)
    }

    /// Parse a template from string content
    pub fn parse(content: &str) -> Result<Self, PromptError> {
        let (frontmatter, body) = split_frontmatter(content)?;

        let mut template: PromptTemplate = serde_yaml::from_str(&frontmatter)?;
        template.body = body;

        if template.name.is_empty() {
            return Err(PromptError::InvalidFormat(
                "Template must have a 'name' field".to_string(),
            ));
        }

        Ok(template)
    }

    /// Render the body against a Tera context
    pub fn render(&self, context: &Context) -> Result<String, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template(&self.name, &self.body)?;
        Ok(tera.render(&self.name, context)?)
    }
}

/// Split content into frontmatter and body
fn split_frontmatter(content: &str) -> Result<(String, String), PromptError> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(PromptError::InvalidFormat(
            "Template must start with YAML frontmatter (---)".to_string(),
        ));
    }

    let rest = &content[3..];
    let end_pos = rest.find("\n---").ok_or_else(|| {
        PromptError::InvalidFormat("Could not find end of frontmatter (---)".to_string())
    })?;

    let frontmatter = rest[..end_pos].trim().to_string();
    let body = rest[end_pos + 4..].trim().to_string();

    Ok((frontmatter, body))
}

/// Which prompt of the set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Summarizes one chunk of pages
    Analyzer,
    /// Merges chunk summaries
    Summarizer,
    /// Writes a forum reply
    Reply,
}

impl PromptKind {
    pub const ALL: [PromptKind; 3] = [
        PromptKind::Analyzer,
        PromptKind::Summarizer,
        PromptKind::Reply,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            PromptKind::Analyzer => "chunk-analysis.prompt.md",
            PromptKind::Summarizer => "reduce.prompt.md",
            PromptKind::Reply => "reply.prompt.md",
        }
    }

    pub fn default_source(self) -> &'static str {
        match self {
            PromptKind::Analyzer => DEFAULT_ANALYZER_PROMPT,
            PromptKind::Summarizer => DEFAULT_SUMMARIZER_PROMPT,
            PromptKind::Reply => DEFAULT_REPLY_PROMPT,
        }
    }
}

/// Inputs of the chunk analyzer prompt
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerVars<'a> {
    pub discussion: &'a str,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_page: u32,
    pub end_page: u32,
}

/// Inputs of the reply prompt
#[derive(Debug, Clone, Serialize)]
pub struct ReplyVars<'a> {
    pub role: &'a str,
    pub task: &'a str,
    pub rules: &'a [String],
    pub discussion: &'a str,
    pub summary: &'a str,
}

/// Read-only snapshot of every prompt the application uses
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub analyzer: PromptTemplate,
    pub summarizer: PromptTemplate,
    pub reply: PromptTemplate,
}

impl PromptSet {
    /// The built-in prompts
    pub fn defaults() -> Result<Self, PromptError> {
        let parse = |kind: PromptKind| PromptTemplate::parse(kind.default_source());
        Ok(Self {
            analyzer: parse(PromptKind::Analyzer)?,
            summarizer: parse(PromptKind::Summarizer)?,
            reply: parse(PromptKind::Reply)?,
        })
    }

    /// Load prompts from a directory, using the built-in prompt for any file
    /// that does not exist
    pub fn load_from_dir(dir: &Path) -> Result<Self, PromptError> {
        let load = |kind: PromptKind| -> Result<PromptTemplate, PromptError> {
            let path = dir.join(kind.file_name());
            if path.exists() {
                debug!("Loading prompt from {}", path.display());
                PromptTemplate::from_file(&path)
            } else {
                PromptTemplate::parse(kind.default_source())
            }
        };

        Ok(Self {
            analyzer: load(PromptKind::Analyzer)?,
            summarizer: load(PromptKind::Summarizer)?,
            reply: load(PromptKind::Reply)?,
        })
    }

    /// Load from `~/.stance/prompts`, or the defaults if it cannot be located
    pub fn load() -> Result<Self, PromptError> {
        match crate::config::Config::prompts_dir() {
            Some(dir) => Self::load_from_dir(&dir),
            None => Self::defaults(),
        }
    }

    pub fn get(&self, kind: PromptKind) -> &PromptTemplate {
        match kind {
            PromptKind::Analyzer => &self.analyzer,
            PromptKind::Summarizer => &self.summarizer,
            PromptKind::Reply => &self.reply,
        }
    }

    pub fn render_analyzer(&self, vars: &AnalyzerVars<'_>) -> Result<String, PromptError> {
        self.analyzer.render(&Context::from_serialize(vars)?)
    }

    pub fn render_summarizer(&self, summaries: &[&str]) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("summaries", summaries);
        context.insert("chunk_count", &summaries.len());
        self.summarizer.render(&context)
    }

    pub fn render_reply(&self, vars: &ReplyVars<'_>) -> Result<String, PromptError> {
        self.reply.render(&Context::from_serialize(vars)?)
    }
}

/// Write the built-in prompts into `dir`.
///
/// Existing files are kept unless `force` is set. Returns the paths written.
pub fn write_defaults(dir: &Path, force: bool) -> Result<Vec<PathBuf>, PromptError> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for kind in PromptKind::ALL {
        let path = dir.join(kind.file_name());
        if path.exists() && !force {
            continue;
        }
        std::fs::write(&path, kind.default_source())?;
        written.push(path);
    }

    info!("Wrote {} default prompts to {}", written.len(), dir.display());
    Ok(written)
}

const DEFAULT_ANALYZER_PROMPT: &str = r#"---
name: "chunk-analysis"
description: "Summarize the positions taken in one chunk of a thread"
---
You are analysing a discussion on an online forum. Below is the opening post
followed by the replies on pages {{ start_page }} to {{ end_page }}
(part {{ chunk_index }} of {{ total_chunks }}).

Describe, in plain prose:
1. Whether the participants actually disagree, and about what.
2. Each distinct stance, who holds it (roughly how many replies), and the
   strongest argument offered for it.
3. Which stance currently dominates, if any.
4. Replies that are neutral, joking or off topic, in one sentence.

Do not quote long passages. Do not output JSON.

[Structured discussion]
{{ discussion }}
"#;

const DEFAULT_SUMMARIZER_PROMPT: &str = r#"---
name: "reduce"
description: "Merge per-chunk stance summaries into one"
---
The following {{ chunk_count }} summaries each describe a consecutive part of
the same forum thread, in order. Merge them into one coherent summary of
where the whole discussion stands: the stances, how support for each evolved
over the thread, and which one dominates at the end. Remove repetition and
do not refer to "parts" or "summaries".
{% for summary in summaries %}
[Part {{ loop.index }}]
{{ summary }}
{% endfor %}
"#;

const DEFAULT_REPLY_PROMPT: &str = r#"---
name: "reply"
description: "Write a reply that fits the discussion"
---
{{ role }}

A discussion is going on in a forum thread and its current state has been
summarised for you. Write one reply that fits your role and your task.

[Discussion]
{{ discussion }}

[Where the discussion stands]
{{ summary }}

[Your task]
{{ task }}

[Rules]
{% for rule in rules %}- {{ rule }}
{% endfor %}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_frontmatter() {
        let content = r#"---
name: test
description: A test template
---
Hello, {{ name }}!"#;

        let (fm, body) = split_frontmatter(content).unwrap();
        assert!(fm.contains("name: test"));
        assert!(body.contains("Hello"));
    }

    #[test]
    fn test_missing_frontmatter_is_rejected() {
        let err = PromptTemplate::parse("Hello there").unwrap_err();
        assert!(matches!(err, PromptError::InvalidFormat(_)));
    }

    #[test]
    fn test_defaults_parse() {
        let set = PromptSet::defaults().unwrap();
        assert_eq!(set.analyzer.name, "chunk-analysis");
        assert_eq!(set.summarizer.name, "reduce");
        assert_eq!(set.reply.name, "reply");
    }

    #[test]
    fn test_render_analyzer() {
        let prompt = PromptSet::defaults()
            .unwrap()
            .render_analyzer(&AnalyzerVars {
                discussion: "[Title]: Tea or coffee",
                chunk_index: 2,
                total_chunks: 3,
                start_page: 5,
                end_page: 8,
            })
            .unwrap();
        assert!(prompt.contains("pages 5 to 8"));
        assert!(prompt.contains("part 2 of 3"));
        assert!(prompt.contains("[Title]: Tea or coffee"));
    }

    #[test]
    fn test_render_summarizer_keeps_order() {
        let prompt = PromptSet::defaults()
            .unwrap()
            .render_summarizer(&["first view", "second view"])
            .unwrap();
        let first = prompt.find("first view").unwrap();
        let second = prompt.find("second view").unwrap();
        assert!(first < second);
        assert!(prompt.contains("[Part 2]"));
        assert!(prompt.contains("The following 2 summaries"));
    }

    #[test]
    fn test_render_reply_lists_rules() {
        let rules = vec!["Be brief.".to_string(), "No insults.".to_string()];
        let prompt = PromptSet::defaults()
            .unwrap()
            .render_reply(&ReplyVars {
                role: "You are a regular.",
                task: "Agree.",
                rules: &rules,
                discussion: "d",
                summary: "s",
            })
            .unwrap();
        assert!(prompt.starts_with("You are a regular."));
        assert!(prompt.contains("- Be brief.\n- No insults."));
    }

    #[test]
    fn test_load_from_dir_overrides_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("reduce.prompt.md"),
            "---\nname: custom-reduce\n---\nMerge: {% for s in summaries %}{{ s }};{% endfor %}",
        )
        .unwrap();

        let set = PromptSet::load_from_dir(dir.path()).unwrap();
        assert_eq!(set.summarizer.name, "custom-reduce");
        assert_eq!(set.analyzer.name, "chunk-analysis");
        assert_eq!(set.render_summarizer(&["a", "b"]).unwrap(), "Merge: a;b;");
    }

    #[test]
    fn test_write_defaults_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_defaults(dir.path(), false).unwrap();
        assert_eq!(written.len(), 3);

        std::fs::write(dir.path().join("reply.prompt.md"), "---\nname: mine\n---\nhi").unwrap();
        assert!(write_defaults(dir.path(), false).unwrap().is_empty());

        write_defaults(dir.path(), true).unwrap();
        let restored = PromptTemplate::from_file(&dir.path().join("reply.prompt.md")).unwrap();
        assert_eq!(restored.name, "reply");
    }
}
