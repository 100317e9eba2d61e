//! Plain-text rendering of discussions.
//!
//! Turns content fragments into flat strings and lays a thread out as a
//! structured text document the analyzer model can read.

use crate::forum::{Comment, ContentFragment, Post, Thread, User};
use std::collections::HashMap;
use tracing::debug;

/// Flatten content fragments into one line of text.
///
/// Never fails: fragments of unknown kind contribute nothing.
pub fn normalize(fragments: &[ContentFragment]) -> String {
    let parts: Vec<String> = fragments
        .iter()
        .filter_map(|fragment| match fragment {
            ContentFragment::Text(text) | ContentFragment::Mention(text) => Some(text.clone()),
            ContentFragment::Emoji { desc } => Some(format!("[emoji:{}]", desc)),
            ContentFragment::Image { .. } => Some("[image]".to_string()),
            ContentFragment::Link { text, .. } => Some(format!("[link:{}]", text)),
            ContentFragment::Voice { .. } => Some("[voice]".to_string()),
            ContentFragment::Unknown { kind } => {
                debug!("Ignoring unknown content fragment: {}", kind);
                None
            }
        })
        .filter(|part| !part.is_empty())
        .collect();

    parts.join(" ").trim().to_string()
}

/// Render the author tags shown next to a post or comment
pub fn author_annotation(author: Option<&User>, thread_author: &User) -> String {
    let name = author.and_then(User::name);
    let mut tags = vec![format!("user: {}", name.unwrap_or("unknown user"))];

    let Some(user) = author else {
        return tags.remove(0);
    };

    if let Some(nick) = user.nick_name.as_deref().map(str::trim) {
        if !nick.is_empty() && Some(nick) != name {
            tags.push(format!("nickname: {}", nick));
        }
    }
    if name.is_some() && name == thread_author.name() {
        tags.push("OP".to_string());
    }
    if user.is_moderator {
        tags.push("moderator".to_string());
    }
    if user.level > 0 {
        tags.push(format!("level {}", user.level));
    }
    if let Some(ip) = user.ip.as_deref().map(str::trim).filter(|ip| !ip.is_empty()) {
        tags.push(format!("from {}", ip));
    }

    tags.join(", ")
}

/// Header block shared by every chunk of a thread
pub fn format_top_post(thread: &Thread) -> String {
    [
        format!("[Title]: {}", thread.title),
        format!(
            "[Author]: {}",
            author_annotation(Some(&thread.author), &thread.author)
        ),
        format!("[Top post]\n{}", normalize(&thread.contents)),
        "---".to_string(),
        "[Discussion]".to_string(),
    ]
    .join("\n")
}

/// Lay out replies and their nested replies.
///
/// The opening post (floor 1) and replies without renderable content are
/// skipped.
pub fn format_chunk(
    thread: &Thread,
    posts: &[Post],
    comments: &HashMap<u64, Vec<Comment>>,
) -> String {
    let mut lines = Vec::new();

    for post in posts {
        if post.floor == 1 {
            continue;
        }
        let text = normalize(&post.contents);
        if text.is_empty() {
            continue;
        }

        lines.push(format!(
            "\n[Reply #{}] ({})",
            post.floor,
            author_annotation(post.author.as_ref(), &thread.author)
        ));
        lines.push(text);

        let Some(nested) = comments.get(&post.pid) else {
            continue;
        };
        for (idx, comment) in nested.iter().enumerate() {
            let text = normalize(&comment.contents);
            if text.is_empty() {
                continue;
            }
            lines.push(format!(
                "  [Nested reply to #{}, #{}] ({})",
                post.floor,
                idx + 1,
                author_annotation(comment.author.as_ref(), &thread.author)
            ));
            lines.push(format!("  > {}", text));
        }
    }

    lines.join("\n")
}

/// Header plus replies, as one document
pub fn format_discussion(
    thread: &Thread,
    posts: &[Post],
    comments: &HashMap<u64, Vec<Comment>>,
) -> String {
    format!(
        "{}\n{}",
        format_top_post(thread),
        format_chunk(thread, posts, comments)
    )
}

/// Cut `text` to at most `max_chars` characters, on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
