//! Forum data model and gateway client.
//!
//! Threads, posts and nested comments as delivered by a JSON forum gateway,
//! plus the [`ForumApi`] trait and its HTTP implementation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors that can occur when talking to the forum gateway
#[derive(Debug, Error)]
pub enum ForumError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Forum gateway returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Thread {0} has no title or top post on its first page")]
    MissingThreadInfo(u64),

    #[error("Invalid sort order '{0}' (expected reply, create or hot)")]
    InvalidSort(String),
}

/// One atomic unit of post content.
///
/// Decoded from `{"type": ..., "text": ..., "desc": ..., "url": ...}`; a
/// `type` this crate does not know becomes [`ContentFragment::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFragment", into = "RawFragment")]
pub enum ContentFragment {
    Text(String),
    Emoji { desc: String },
    /// Any image; `kind` keeps the wire sub-type (`image_p`, `image_c`, ...)
    Image { kind: String },
    Mention(String),
    Link { text: String, url: String },
    Voice { kind: String },
    Unknown { kind: String },
}

impl ContentFragment {
    pub fn text(text: impl Into<String>) -> Self {
        ContentFragment::Text(text.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFragment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl From<RawFragment> for ContentFragment {
    fn from(raw: RawFragment) -> Self {
        let RawFragment {
            kind,
            text,
            desc,
            url,
        } = raw;
        match kind.as_str() {
            "text" => ContentFragment::Text(text.unwrap_or_default()),
            "emoji" => ContentFragment::Emoji {
                desc: desc.or(text).unwrap_or_default(),
            },
            "image" | "image_p" | "image_c" | "image_t" => ContentFragment::Image { kind },
            "at" | "mention" => ContentFragment::Mention(text.unwrap_or_default()),
            "link" => ContentFragment::Link {
                text: text.unwrap_or_default(),
                url: url.unwrap_or_default(),
            },
            "voice" | "voice_p" | "voice_c" => ContentFragment::Voice { kind },
            _ => ContentFragment::Unknown { kind },
        }
    }
}

impl From<ContentFragment> for RawFragment {
    fn from(fragment: ContentFragment) -> Self {
        let raw = |kind: &str| RawFragment {
            kind: kind.to_string(),
            text: None,
            desc: None,
            url: None,
        };
        match fragment {
            ContentFragment::Text(text) => RawFragment {
                text: Some(text),
                ..raw("text")
            },
            ContentFragment::Emoji { desc } => RawFragment {
                desc: Some(desc),
                ..raw("emoji")
            },
            ContentFragment::Image { kind } | ContentFragment::Voice { kind } => raw(&kind),
            ContentFragment::Mention(text) => RawFragment {
                text: Some(text),
                ..raw("at")
            },
            ContentFragment::Link { text, url } => RawFragment {
                text: Some(text),
                url: Some(url),
                ..raw("link")
            },
            ContentFragment::Unknown { kind } => raw(&kind),
        }
    }
}

/// A forum user as seen on a post or comment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub is_moderator: bool,
    /// Coarse origin (region / IP location) when the forum exposes it
    #[serde(default)]
    pub ip: Option<String>,
}

impl User {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            user_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// The account name, if the forum delivered a non-blank one
    pub fn name(&self) -> Option<&str> {
        self.user_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// A top-level reply ("floor") in a thread; floor 1 is the opening post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub pid: u64,
    pub floor: u32,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub contents: Vec<ContentFragment>,
    /// Number of nested replies, when the gateway reports it
    #[serde(default)]
    pub comment_count: Option<u32>,
}

/// A nested reply attached to a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub pid: u64,
    /// Id of the owning post
    pub ppid: u64,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub contents: Vec<ContentFragment>,
}

/// Paging metadata of a posts response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub current_page: u32,
    pub total_page: u32,
}

/// A thread as it appears in listings and search results.
///
/// Only the id and title are guaranteed; everything else depends on where
/// the record came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialThread {
    pub tid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub contents: Option<Vec<ContentFragment>>,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub reply_num: Option<u32>,
    /// Unix timestamp of the last reply
    #[serde(default)]
    pub last_time: Option<i64>,
}

/// Response body of the posts endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsPage {
    #[serde(default)]
    pub thread: Option<PartialThread>,
    pub page: PageInfo,
    #[serde(default)]
    pub posts: Vec<Post>,
}

/// Everything one page contributes to an analysis
#[derive(Debug, Clone, Default)]
pub struct PageData {
    pub thread: Option<PartialThread>,
    pub total_pages: u32,
    pub posts: Vec<Post>,
    /// Nested replies keyed by owning post id
    pub comments: HashMap<u64, Vec<Comment>>,
}

/// A thread with its top post and page count known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub tid: u64,
    pub title: String,
    pub contents: Vec<ContentFragment>,
    pub author: User,
    pub total_pages: u32,
}

impl Thread {
    /// Combine a listing record (if any) with a fetched page into a full thread.
    ///
    /// Listing fields win when present; missing ones are filled from the
    /// page's thread header, then from the floor-1 post. `tid` is the id the
    /// page was requested for and is used when neither record carries one.
    pub fn resolve(
        tid: u64,
        listing: Option<&PartialThread>,
        page: &PageData,
    ) -> Result<Thread, ForumError> {
        let header = page.thread.as_ref();
        let top_post = page.posts.iter().find(|p| p.floor == 1);

        let tid = listing.or(header).map(|t| t.tid).unwrap_or(tid);

        let title = [listing, header]
            .into_iter()
            .flatten()
            .map(|t| t.title.trim())
            .find(|t| !t.is_empty())
            .ok_or(ForumError::MissingThreadInfo(tid))?
            .to_string();

        let contents = [listing, header]
            .into_iter()
            .flatten()
            .filter_map(|t| t.contents.as_ref())
            .find(|c| !c.is_empty())
            .cloned()
            .or_else(|| top_post.map(|p| p.contents.clone()))
            .unwrap_or_default();

        let author = [listing, header]
            .into_iter()
            .flatten()
            .filter_map(|t| t.author.clone())
            .next()
            .or_else(|| top_post.and_then(|p| p.author.clone()))
            .unwrap_or_default();

        Ok(Thread {
            tid,
            title,
            contents,
            author,
            total_pages: page.total_pages.max(1),
        })
    }
}

/// Thread listing order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadSort {
    /// Most recently replied first
    #[default]
    Reply,
    /// Most recently created first
    Create,
    Hot,
}

impl ThreadSort {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadSort::Reply => "reply",
            ThreadSort::Create => "create",
            ThreadSort::Hot => "hot",
        }
    }
}

impl std::fmt::Display for ThreadSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThreadSort {
    type Err = ForumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reply" => Ok(ThreadSort::Reply),
            "create" => Ok(ThreadSort::Create),
            "hot" => Ok(ThreadSort::Hot),
            other => Err(ForumError::InvalidSort(other.to_string())),
        }
    }
}

/// Read access to a forum
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// One page of top-level posts of a thread
    async fn get_posts(&self, tid: u64, page: u32) -> Result<PostsPage, ForumError>;

    /// All nested replies of one post
    async fn get_comments(&self, tid: u64, pid: u64) -> Result<Vec<Comment>, ForumError>;

    /// One page of a forum's thread listing
    async fn list_threads(
        &self,
        forum: &str,
        page: u32,
        sort: ThreadSort,
    ) -> Result<Vec<PartialThread>, ForumError>;

    /// Keyword search inside one forum (threads only)
    async fn search_threads(
        &self,
        forum: &str,
        query: &str,
        page: u32,
    ) -> Result<Vec<PartialThread>, ForumError>;
}

/// [`ForumApi`] over a JSON HTTP gateway
pub struct HttpForumClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpForumClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, ForumError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent(concat!("stance/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build a client from the `[forum]` config section
    pub fn from_config(config: &crate::config::ForumConfig) -> Result<Self, ForumError> {
        Self::new(&config.base_url, config.timeout_secs)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ForumError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ForumError::Status {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ForumApi for HttpForumClient {
    #[instrument(skip(self))]
    async fn get_posts(&self, tid: u64, page: u32) -> Result<PostsPage, ForumError> {
        self.get_json(
            &format!("/threads/{}/posts", tid),
            &[("pn", page.to_string())],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_comments(&self, tid: u64, pid: u64) -> Result<Vec<Comment>, ForumError> {
        self.get_json(&format!("/threads/{}/posts/{}/comments", tid, pid), &[])
            .await
    }

    #[instrument(skip(self))]
    async fn list_threads(
        &self,
        forum: &str,
        page: u32,
        sort: ThreadSort,
    ) -> Result<Vec<PartialThread>, ForumError> {
        self.get_json(
            &format!("/forums/{}/threads", forum),
            &[("pn", page.to_string()), ("sort", sort.to_string())],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn search_threads(
        &self,
        forum: &str,
        query: &str,
        page: u32,
    ) -> Result<Vec<PartialThread>, ForumError> {
        self.get_json(
            &format!("/forums/{}/search", forum),
            &[("q", query.to_string()), ("pn", page.to_string())],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_decoding() {
        let json = r#"[
            {"type": "text", "text": "hello"},
            {"type": "emoji", "desc": "smile"},
            {"type": "image_c", "url": "https://img/1.jpg"},
            {"type": "at", "text": "@bob"},
            {"type": "link", "text": "docs", "url": "https://example.com"},
            {"type": "voice_p"},
            {"type": "tiebaplus_ad", "text": "buy now"}
        ]"#;
        let frags: Vec<ContentFragment> = serde_json::from_str(json).unwrap();

        assert_eq!(frags[0], ContentFragment::text("hello"));
        assert_eq!(
            frags[1],
            ContentFragment::Emoji {
                desc: "smile".to_string()
            }
        );
        assert!(matches!(&frags[2], ContentFragment::Image { kind } if kind == "image_c"));
        assert_eq!(frags[3], ContentFragment::Mention("@bob".to_string()));
        assert!(matches!(&frags[4], ContentFragment::Link { url, .. } if url == "https://example.com"));
        assert!(matches!(&frags[5], ContentFragment::Voice { .. }));
        assert_eq!(
            frags[6],
            ContentFragment::Unknown {
                kind: "tiebaplus_ad".to_string()
            }
        );
    }

    #[test]
    fn test_fragment_encoding_keeps_wire_shape() {
        let json = serde_json::to_value(ContentFragment::Mention("@amy".to_string())).unwrap();
        assert_eq!(json["type"], "at");
        assert_eq!(json["text"], "@amy");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_posts_page_decoding_with_missing_fields() {
        let json = r#"{
            "page": {"current_page": 1, "total_page": 7},
            "posts": [{"pid": 10, "floor": 2}]
        }"#;
        let page: PostsPage = serde_json::from_str(json).unwrap();
        assert!(page.thread.is_none());
        assert_eq!(page.page.total_page, 7);
        assert!(page.posts[0].author.is_none());
        assert!(page.posts[0].contents.is_empty());
    }

    fn page_with_header(header: Option<PartialThread>) -> PageData {
        PageData {
            thread: header,
            total_pages: 3,
            posts: vec![Post {
                pid: 100,
                floor: 1,
                author: Some(User::named("op")),
                contents: vec![ContentFragment::text("opening words")],
                comment_count: None,
            }],
            comments: HashMap::new(),
        }
    }

    #[test]
    fn test_resolve_prefers_listing_then_page() {
        let listing = PartialThread {
            tid: 42,
            title: "Listing title".to_string(),
            contents: None,
            author: None,
            reply_num: Some(80),
            last_time: None,
        };
        let header = PartialThread {
            tid: 42,
            title: "Header title".to_string(),
            contents: Some(vec![ContentFragment::text("header body")]),
            author: Some(User::named("op")),
            reply_num: None,
            last_time: None,
        };

        let thread = Thread::resolve(42, Some(&listing), &page_with_header(Some(header))).unwrap();
        assert_eq!(thread.tid, 42);
        assert_eq!(thread.title, "Listing title");
        assert_eq!(thread.contents, vec![ContentFragment::text("header body")]);
        assert_eq!(thread.author.name(), Some("op"));
        assert_eq!(thread.total_pages, 3);
    }

    #[test]
    fn test_resolve_falls_back_to_first_floor() {
        let header = PartialThread {
            tid: 7,
            title: "Only a title".to_string(),
            contents: None,
            author: None,
            reply_num: None,
            last_time: None,
        };
        let thread = Thread::resolve(7, None, &page_with_header(Some(header))).unwrap();
        assert_eq!(thread.contents, vec![ContentFragment::text("opening words")]);
        assert_eq!(thread.author.name(), Some("op"));
    }

    #[test]
    fn test_resolve_without_title_fails() {
        let err = Thread::resolve(9001, None, &page_with_header(None)).unwrap_err();
        assert!(matches!(err, ForumError::MissingThreadInfo(9001)));
        assert!(err.to_string().starts_with("Thread 9001 "));
    }

    #[test]
    fn test_thread_sort_parsing() {
        assert_eq!("HOT".parse::<ThreadSort>().unwrap(), ThreadSort::Hot);
        assert!("newest".parse::<ThreadSort>().is_err());
        assert_eq!(ThreadSort::default().to_string(), "reply");
    }
}
