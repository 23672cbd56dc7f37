use std::sync::Arc;

use uuid::Uuid;

use crate::backend::Backend;
use crate::cache::{QueryCache, QueryKey};
use crate::error::{AppError, Result};
use crate::models::Post;

/// Post detail and deletion plumbing shared by the detail screen.
pub struct PostService<B> {
    backend: Arc<B>,
    cache: Arc<QueryCache>,
}

impl<B: Backend> PostService<B> {
    pub fn new(backend: Arc<B>, cache: Arc<QueryCache>) -> Self {
        Self { backend, cache }
    }

    /// Memoized detail fetch. An absent post is a terminal not-found
    /// state for the detail view, not a crash.
    pub async fn get_post(&self, id: Uuid) -> Result<Post> {
        let post: Option<Post> = self
            .cache
            .get_or_fetch(QueryKey::Post(id), || async {
                self.backend.get_post(id).await
            })
            .await?;
        post.ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }

    /// Deletes the post and invalidates the feed and detail queries.
    /// Cascading deletion of comments and votes is the backend's job.
    pub async fn delete_post(&self, id: Uuid) -> Result<()> {
        self.backend.delete_post(id).await?;
        tracing::info!(post_id = %id, "post deleted");
        self.cache.invalidate(&QueryKey::Posts);
        self.cache.invalidate(&QueryKey::Post(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use chrono::Utc;

    fn service() -> (Arc<InMemoryBackend>, PostService<InMemoryBackend>, Uuid) {
        let backend = Arc::new(InMemoryBackend::new(Uuid::new_v4()));
        let group = backend.seed_group("rust", None);
        let post_id = backend.seed_post("hello", group.id, Utc::now());
        let service = PostService::new(backend.clone(), Arc::new(QueryCache::new()));
        (backend, service, post_id)
    }

    #[tokio::test]
    async fn detail_is_memoized() {
        let (backend, service, post_id) = service();

        let post = service.get_post(post_id).await.unwrap();
        assert_eq!(post.title, "hello");
        service.get_post(post_id).await.unwrap();
        assert_eq!(backend.call_count("get_post"), 1);
    }

    #[tokio::test]
    async fn missing_post_is_not_found() {
        let (_, service, _) = service();
        let result = service.get_post(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_invalidates_the_detail_query() {
        let (backend, service, post_id) = service();

        service.get_post(post_id).await.unwrap();
        service.delete_post(post_id).await.unwrap();

        let result = service.get_post(post_id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(backend.call_count("get_post"), 2);
    }
}
