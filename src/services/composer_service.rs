use std::sync::Arc;

use validator::Validate;

use crate::backend::Backend;
use crate::cache::{QueryCache, QueryKey};
use crate::error::{AppError, Result};
use crate::models::{Group, LocalImage, NewPost, Post};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerPhase {
    Editing,
    Submitting,
    Success,
    Failed,
}

/// What the compose screen is holding. The selected group is explicit
/// composer state, not ambient global state shared with the selector
/// screen; the selector hands its pick to `select_group`.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    pub group: Option<Group>,
    pub image: Option<LocalImage>,
}

/// Create-post workflow: `Editing -> Submitting -> {Success, Failed}`.
///
/// Preconditions are checked locally before any network call, the image
/// (if any) is uploaded before the post row is created, and a failure at
/// any point preserves the draft so the user can retry.
pub struct PostComposer<B> {
    backend: Arc<B>,
    cache: Arc<QueryCache>,
    draft: PostDraft,
    phase: ComposerPhase,
}

impl<B: Backend> PostComposer<B> {
    pub fn new(backend: Arc<B>, cache: Arc<QueryCache>) -> Self {
        Self {
            backend,
            cache,
            draft: PostDraft::default(),
            phase: ComposerPhase::Editing,
        }
    }

    pub fn draft(&self) -> &PostDraft {
        &self.draft
    }

    pub fn phase(&self) -> ComposerPhase {
        self.phase
    }

    pub fn set_title(&mut self, title: &str) {
        self.draft.title = title.to_string();
        self.phase = ComposerPhase::Editing;
    }

    pub fn set_body(&mut self, body: &str) {
        self.draft.body = body.to_string();
        self.phase = ComposerPhase::Editing;
    }

    pub fn select_group(&mut self, group: Group) {
        self.draft.group = Some(group);
        self.phase = ComposerPhase::Editing;
    }

    pub fn attach_image(&mut self, image: LocalImage) {
        self.draft.image = Some(image);
        self.phase = ComposerPhase::Editing;
    }

    /// Abandons the draft, clearing the selected group with it.
    pub fn cancel(&mut self) {
        self.draft = PostDraft::default();
        self.phase = ComposerPhase::Editing;
    }

    /// Runs the whole workflow. On success the draft is cleared and the
    /// feed invalidated so the new post shows up on the next read; on
    /// failure the draft is kept and the error is returned for the screen
    /// to alert.
    pub async fn submit(&mut self) -> Result<Post> {
        if self.phase == ComposerPhase::Submitting {
            return Err(AppError::Validation(
                "submission already in progress".to_string(),
            ));
        }
        self.phase = ComposerPhase::Submitting;

        match self.try_submit().await {
            Ok(post) => {
                self.draft = PostDraft::default();
                self.phase = ComposerPhase::Success;
                self.cache.invalidate(&QueryKey::Posts);
                tracing::info!(post_id = %post.id, "post created");
                Ok(post)
            }
            Err(error) => {
                self.phase = ComposerPhase::Failed;
                tracing::warn!(%error, "post submission failed");
                Err(error)
            }
        }
    }

    async fn try_submit(&self) -> Result<Post> {
        // Local preconditions, in order, before any network call.
        let Some(group) = &self.draft.group else {
            return Err(AppError::Validation("group required".to_string()));
        };
        if self.draft.title.trim().is_empty() {
            return Err(AppError::Validation("title required".to_string()));
        }

        let mut new_post = NewPost {
            title: self.draft.title.clone(),
            description: if self.draft.body.is_empty() {
                None
            } else {
                Some(self.draft.body.clone())
            },
            group_id: group.id,
            image: None,
        };
        new_post.validate()?;

        // Image first: no post row may exist without its intended image.
        if let Some(local) = &self.draft.image {
            let reference = self
                .backend
                .upload_image(local)
                .await
                .map_err(|e| match e {
                    upload @ AppError::Upload(_) => upload,
                    other => AppError::Upload(other.to_string()),
                })?;
            new_post.image = Some(reference);
        }

        self.backend.create_post(&new_post).await
    }

    #[cfg(test)]
    fn force_phase(&mut self, phase: ComposerPhase) {
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use uuid::Uuid;

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        cache: Arc<QueryCache>,
        composer: PostComposer<InMemoryBackend>,
        group: Group,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::new(Uuid::new_v4()));
        let cache = Arc::new(QueryCache::new());
        let group = backend.seed_group("rust", None);
        Fixture {
            backend: backend.clone(),
            cache: cache.clone(),
            composer: PostComposer::new(backend, cache),
            group,
        }
    }

    #[tokio::test]
    async fn submitting_without_group_fails_before_any_network_call() {
        let mut f = fixture();
        f.composer.set_title("a title");

        let result = f.composer.submit().await;
        assert!(matches!(result, Err(AppError::Validation(ref m)) if m == "group required"));
        assert!(f.backend.calls().is_empty());
        assert_eq!(f.composer.phase(), ComposerPhase::Failed);
        // Draft preserved for retry.
        assert_eq!(f.composer.draft().title, "a title");
    }

    #[tokio::test]
    async fn submitting_without_title_fails_before_any_network_call() {
        let mut f = fixture();
        let group = f.group.clone();
        f.composer.select_group(group);
        f.composer.set_title("   ");

        let result = f.composer.submit().await;
        assert!(matches!(result, Err(AppError::Validation(ref m)) if m == "title required"));
        assert!(f.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn overlong_title_fails_before_the_image_upload() {
        let mut f = fixture();
        let group = f.group.clone();
        f.composer.select_group(group);
        f.composer.set_title(&"x".repeat(301));
        f.composer.attach_image(LocalImage {
            file_name: "cat.png".to_string(),
            bytes: vec![1],
        });

        let result = f.composer.submit().await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(f.backend.calls().is_empty());
        assert_eq!(f.backend.call_count("upload_image"), 0);
        assert_eq!(f.composer.phase(), ComposerPhase::Failed);
    }

    #[tokio::test]
    async fn upload_failure_aborts_without_creating_the_post() {
        let mut f = fixture();
        let group = f.group.clone();
        f.composer.select_group(group);
        f.composer.set_title("with image");
        f.composer.attach_image(LocalImage {
            file_name: "cat.png".to_string(),
            bytes: vec![1, 2, 3],
        });
        f.backend.fail_op("upload_image");

        let result = f.composer.submit().await;
        assert!(matches!(result, Err(AppError::Upload(_))));
        assert_eq!(f.backend.post_count(), 0);
        assert_eq!(f.backend.call_count("create_post"), 0);
        assert_eq!(f.composer.phase(), ComposerPhase::Failed);
        assert!(f.composer.draft().image.is_some());
    }

    #[tokio::test]
    async fn successful_submit_clears_the_draft_and_invalidates_the_feed() {
        let mut f = fixture();
        let group = f.group.clone();
        f.composer.select_group(group.clone());
        f.composer.set_title("hello world");
        f.composer.set_body("first post");

        // Prime the feed cache so invalidation is observable.
        let fetched: Vec<u32> = f
            .cache
            .get_or_fetch(QueryKey::Posts, || async { Ok(vec![1]) })
            .await
            .unwrap();
        assert_eq!(fetched, vec![1]);

        let post = f.composer.submit().await.unwrap();
        assert_eq!(post.title, "hello world");
        assert_eq!(post.description.as_deref(), Some("first post"));
        assert_eq!(post.group.id, group.id);

        assert_eq!(f.composer.phase(), ComposerPhase::Success);
        assert!(f.composer.draft().title.is_empty());
        assert!(f.composer.draft().group.is_none());

        let refetched: Vec<u32> = f
            .cache
            .get_or_fetch(QueryKey::Posts, || async { Ok(vec![2]) })
            .await
            .unwrap();
        assert_eq!(refetched, vec![2]);
    }

    #[tokio::test]
    async fn image_reference_lands_on_the_post() {
        let mut f = fixture();
        let group = f.group.clone();
        f.composer.select_group(group);
        f.composer.set_title("look at this");
        f.composer.attach_image(LocalImage {
            file_name: "dog.jpg".to_string(),
            bytes: vec![9, 9],
        });

        let post = f.composer.submit().await.unwrap();
        let image = post.image.expect("uploaded image reference");
        assert!(image.ends_with("dog.jpg"));
        assert_eq!(f.backend.call_count("upload_image"), 1);
    }

    #[tokio::test]
    async fn submit_while_submitting_is_rejected_locally() {
        let mut f = fixture();
        f.composer.force_phase(ComposerPhase::Submitting);

        let result = f.composer.submit().await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(f.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn a_failed_submission_can_be_retried() {
        let mut f = fixture();
        let group = f.group.clone();
        f.composer.set_title("resilient");
        f.composer.select_group(group);

        f.backend.fail_op("create_post");
        assert!(f.composer.submit().await.is_err());
        assert_eq!(f.composer.phase(), ComposerPhase::Failed);
        assert_eq!(f.composer.draft().title, "resilient");

        f.backend.clear_failures();
        let post = f.composer.submit().await.unwrap();
        assert_eq!(post.title, "resilient");
        assert_eq!(f.backend.post_count(), 1);
    }

    #[tokio::test]
    async fn cancel_clears_the_selected_group() {
        let mut f = fixture();
        let group = f.group.clone();
        f.composer.select_group(group);
        f.composer.set_title("draft");

        f.composer.cancel();
        assert!(f.composer.draft().group.is_none());
        assert!(f.composer.draft().title.is_empty());
    }
}
