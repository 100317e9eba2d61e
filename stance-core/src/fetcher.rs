//! Page fetching.
//!
//! A [`PageFetcher`] turns `(thread, page)` into the posts of that page and
//! the nested replies of those posts.

use crate::forum::{Comment, ForumApi, ForumError, PageData, PartialThread, Post, Thread};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Source of discussion pages. Must be safe to call repeatedly for the same page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, thread_id: u64, page: u32) -> Result<PageData, ForumError>;
}

/// [`PageFetcher`] backed by a [`ForumApi`]
pub struct ForumPageFetcher<A> {
    api: A,
    max_comment_posts: usize,
}

impl<A: ForumApi> ForumPageFetcher<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            max_comment_posts: 50,
        }
    }

    /// Limit how many posts per page get their nested replies fetched
    pub fn with_max_comment_posts(mut self, max: usize) -> Self {
        self.max_comment_posts = max;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Fetch page 1 and resolve the full thread from it
    pub async fn resolve_thread(
        &self,
        thread_id: u64,
        listing: Option<&PartialThread>,
    ) -> Result<(Thread, PageData), ForumError> {
        let first = self.fetch_page(thread_id, 1).await?;
        let thread = Thread::resolve(thread_id, listing, &first)?;
        info!(
            "Resolved thread {} \"{}\" ({} pages)",
            thread.tid, thread.title, thread.total_pages
        );
        Ok((thread, first))
    }

    /// Fetch nested replies for the given posts concurrently.
    ///
    /// A failed fetch for one post is logged and leaves that post without
    /// comments; it never fails the page.
    async fn fetch_comments(&self, thread_id: u64, posts: &[Post]) -> HashMap<u64, Vec<Comment>> {
        let targets: Vec<&Post> = posts
            .iter()
            .filter(|p| p.floor != 1 && p.comment_count != Some(0))
            .take(self.max_comment_posts)
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|post| self.api.get_comments(thread_id, post.pid)),
        )
        .await;

        let mut comments = HashMap::new();
        for (post, result) in targets.iter().zip(results) {
            match result {
                Ok(list) if list.is_empty() => {}
                Ok(list) => {
                    debug!("Fetched {} nested replies for post {}", list.len(), post.pid);
                    comments.insert(post.pid, list);
                }
                Err(e) => warn!("Failed to fetch nested replies for post {}: {}", post.pid, e),
            }
        }
        comments
    }
}

#[async_trait]
impl<A: ForumApi> PageFetcher for ForumPageFetcher<A> {
    #[instrument(skip(self))]
    async fn fetch_page(&self, thread_id: u64, page: u32) -> Result<PageData, ForumError> {
        let posts_page = self.api.get_posts(thread_id, page).await?;
        debug!(
            "Page {}/{} of thread {}: {} posts",
            posts_page.page.current_page,
            posts_page.page.total_page,
            thread_id,
            posts_page.posts.len()
        );

        let comments = self.fetch_comments(thread_id, &posts_page.posts).await;

        Ok(PageData {
            thread: posts_page.thread,
            total_pages: posts_page.page.total_page,
            posts: posts_page.posts,
            comments,
        })
    }
}

/// Serves pages that were already fetched once before delegating.
///
/// Each seeded page is handed out a single time; later requests for it go to
/// the inner fetcher like any other page.
pub struct SeededFetcher<'a> {
    inner: &'a dyn PageFetcher,
    seeded: Mutex<HashMap<u32, PageData>>,
}

impl<'a> SeededFetcher<'a> {
    pub fn new(inner: &'a dyn PageFetcher) -> Self {
        Self {
            inner,
            seeded: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_page(self, page: u32, data: PageData) -> Self {
        if let Ok(mut seeded) = self.seeded.lock() {
            seeded.insert(page, data);
        }
        self
    }
}

#[async_trait]
impl PageFetcher for SeededFetcher<'_> {
    async fn fetch_page(&self, thread_id: u64, page: u32) -> Result<PageData, ForumError> {
        let seeded = self
            .seeded
            .lock()
            .ok()
            .and_then(|mut seeded| seeded.remove(&page));
        if let Some(data) = seeded {
            debug!("Page {} of thread {} served from seed", page, thread_id);
            return Ok(data);
        }
        self.inner.fetch_page(thread_id, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forum::{ContentFragment, PageInfo, PostsPage, ThreadSort, User};

    /// Two pages; comment fetch for post 3 fails
    struct FakeForum {
        page_calls: Mutex<Vec<u32>>,
        comment_calls: Mutex<Vec<u64>>,
    }

    fn post(pid: u64, floor: u32, comment_count: Option<u32>) -> Post {
        Post {
            pid,
            floor,
            author: Some(User::named(format!("user{}", pid))),
            contents: vec![ContentFragment::text(format!("post {}", pid))],
            comment_count,
        }
    }

    #[async_trait]
    impl ForumApi for FakeForum {
        async fn get_posts(&self, tid: u64, page: u32) -> Result<PostsPage, ForumError> {
            self.page_calls.lock().unwrap().push(page);
            let posts = match page {
                1 => vec![post(1, 1, None), post(2, 2, None), post(3, 3, None)],
                2 => vec![post(4, 4, Some(0))],
                _ => return Err(ForumError::MissingThreadInfo(tid)),
            };
            Ok(PostsPage {
                thread: Some(PartialThread {
                    tid,
                    title: "Fake".to_string(),
                    contents: None,
                    author: Some(User::named("user1")),
                    reply_num: None,
                    last_time: None,
                }),
                page: PageInfo {
                    current_page: page,
                    total_page: 2,
                },
                posts,
            })
        }

        async fn get_comments(&self, _tid: u64, pid: u64) -> Result<Vec<Comment>, ForumError> {
            self.comment_calls.lock().unwrap().push(pid);
            if pid == 3 {
                return Err(ForumError::Status {
                    status: 500,
                    url: "comments".to_string(),
                });
            }
            Ok(vec![Comment {
                pid: pid * 100,
                ppid: pid,
                author: None,
                contents: vec![ContentFragment::text("nested")],
            }])
        }

        async fn list_threads(
            &self,
            _forum: &str,
            _page: u32,
            _sort: ThreadSort,
        ) -> Result<Vec<PartialThread>, ForumError> {
            Ok(Vec::new())
        }

        async fn search_threads(
            &self,
            _forum: &str,
            _query: &str,
            _page: u32,
        ) -> Result<Vec<PartialThread>, ForumError> {
            Ok(Vec::new())
        }
    }

    fn fetcher() -> ForumPageFetcher<FakeForum> {
        ForumPageFetcher::new(FakeForum {
            page_calls: Mutex::new(Vec::new()),
            comment_calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_failed_comment_fetch_does_not_fail_page() {
        let fetcher = fetcher();
        let page = fetcher.fetch_page(9, 1).await.unwrap();

        assert_eq!(page.posts.len(), 3);
        assert_eq!(page.total_pages, 2);
        assert!(page.comments.contains_key(&2));
        assert!(!page.comments.contains_key(&3));

        // The opening post is never asked for nested replies
        let mut calls = fetcher.api().comment_calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_posts_without_comments_are_not_queried() {
        let fetcher = fetcher();
        let page = fetcher.fetch_page(9, 2).await.unwrap();
        assert!(page.comments.is_empty());
        assert!(fetcher.api().comment_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_fan_out_is_capped() {
        let fetcher = fetcher().with_max_comment_posts(1);
        fetcher.fetch_page(9, 1).await.unwrap();
        assert_eq!(*fetcher.api().comment_calls.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_resolve_thread() {
        let (thread, first) = fetcher().resolve_thread(9, None).await.unwrap();
        assert_eq!(thread.title, "Fake");
        assert_eq!(thread.total_pages, 2);
        assert_eq!(thread.contents, vec![ContentFragment::text("post 1")]);
        assert_eq!(first.posts.len(), 3);
    }

    #[tokio::test]
    async fn test_seeded_first_page_is_not_fetched_again() {
        let inner = fetcher();
        let (_, first) = inner.resolve_thread(9, None).await.unwrap();
        assert_eq!(*inner.api().page_calls.lock().unwrap(), vec![1]);

        let seeded = SeededFetcher::new(&inner).with_page(1, first);
        let page = seeded.fetch_page(9, 1).await.unwrap();
        assert_eq!(page.posts.len(), 3);
        seeded.fetch_page(9, 2).await.unwrap();
        assert_eq!(*inner.api().page_calls.lock().unwrap(), vec![1, 2]);

        // A seed is used once, then the page is fetched normally
        seeded.fetch_page(9, 1).await.unwrap();
        assert_eq!(*inner.api().page_calls.lock().unwrap(), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_page_error_propagates() {
        assert!(fetcher().fetch_page(9, 5).await.is_err());
    }
}
