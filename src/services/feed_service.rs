use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::Backend;
use crate::cache::{QueryCache, QueryKey};
use crate::error::Result;
use crate::models::Post;

/// Where the next page starts.
///
/// With `Offset` the next offset is the total number of items
/// accumulated so far. That is fragile under concurrent inserts (a new
/// post shifts every offset, duplicating or skipping rows), which is why
/// `After` exists: a keyset bound on (created_at, id) that stays correct
/// while the feed moves underneath.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FeedCursor {
    Offset {
        limit: u32,
        offset: u32,
    },
    After {
        limit: u32,
        created_before: DateTime<Utc>,
        id_before: Uuid,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    Offset,
    Keyset,
}

/// Fetches the feed page by page, concatenating pages in fetch order and
/// dropping duplicate ids. An empty page marks the end of the feed.
pub struct FeedPaginator<B> {
    backend: Arc<B>,
    cache: Arc<QueryCache>,
    page_size: u32,
    mode: CursorMode,
    posts: Vec<Post>,
    seen: HashSet<Uuid>,
    exhausted: bool,
}

impl<B: Backend> FeedPaginator<B> {
    pub fn new(backend: Arc<B>, cache: Arc<QueryCache>, page_size: u32) -> Self {
        Self::with_mode(backend, cache, page_size, CursorMode::Offset)
    }

    pub fn with_mode(
        backend: Arc<B>,
        cache: Arc<QueryCache>,
        page_size: u32,
        mode: CursorMode,
    ) -> Self {
        Self {
            backend,
            cache,
            page_size,
            mode,
            posts: Vec::new(),
            seen: HashSet::new(),
            exhausted: false,
        }
    }

    /// Everything accumulated so far, newest first.
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn has_more(&self) -> bool {
        !self.exhausted
    }

    /// The cursor the next fetch would use, or None at end-of-feed.
    pub fn next_cursor(&self) -> Option<FeedCursor> {
        if self.exhausted {
            return None;
        }
        match self.mode {
            CursorMode::Offset => Some(FeedCursor::Offset {
                limit: self.page_size,
                offset: self.posts.len() as u32,
            }),
            CursorMode::Keyset => match self.posts.last() {
                None => Some(FeedCursor::Offset {
                    limit: self.page_size,
                    offset: 0,
                }),
                Some(last) => Some(FeedCursor::After {
                    limit: self.page_size,
                    created_before: last.created_at,
                    id_before: last.id,
                }),
            },
        }
    }

    /// Fetches the next page and appends it. Returns how many posts were
    /// actually added after de-duplication. Once the backend returns an
    /// empty page this becomes a no-op.
    pub async fn next_page(&mut self) -> Result<usize> {
        if self.exhausted {
            return Ok(0);
        }

        let page = match (self.mode, self.posts.last()) {
            (CursorMode::Keyset, Some(last)) => {
                let before = Some((last.created_at, last.id));
                self.backend
                    .list_posts_before(before, self.page_size)
                    .await?
            }
            (CursorMode::Keyset, None) => {
                self.backend.list_posts_before(None, self.page_size).await?
            }
            (CursorMode::Offset, _) => {
                let limit = self.page_size;
                let offset = self.posts.len() as u32;
                self.cache
                    .get_or_fetch(QueryKey::PostsPage { limit, offset }, || async {
                        self.backend.list_posts(limit, offset).await
                    })
                    .await?
            }
        };

        if page.is_empty() {
            self.exhausted = true;
            tracing::debug!(total = self.posts.len(), "feed exhausted");
            return Ok(0);
        }

        let mut added = 0;
        for post in page {
            if self.seen.insert(post.id) {
                self.posts.push(post);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Manual refresh: drops the accumulation, invalidates the cached
    /// feed and re-issues the first page. Replaces, never merges.
    pub async fn refresh(&mut self) -> Result<()> {
        self.posts.clear();
        self.seen.clear();
        self.exhausted = false;
        self.cache.invalidate(&QueryKey::Posts);
        self.next_page().await?;
        Ok(())
    }
}
