use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Comment, Group, LocalImage, NewComment, NewPost, Post, Vote, VoteValue};

pub mod memory;
pub mod rest;

pub use memory::InMemoryBackend;
pub use rest::RestBackend;

/// The backend-as-a-service collaborator. Persistence, joins, aggregation
/// and image storage all live behind this trait; the core only states what
/// it needs from them.
///
/// Reads return backend-ordered rows (posts newest first, comments in
/// creation order). `upsert_vote` must keep at most one row per
/// (post, user). The authenticated user is part of the implementation's
/// call context, not a parameter of the write operations.
#[allow(async_fn_in_trait)]
pub trait Backend: Send + Sync {
    /// Posts ordered by creation time descending, each carrying its group,
    /// aggregated vote sum and comment count.
    async fn list_posts(&self, limit: u32, offset: u32) -> Result<Vec<Post>>;

    /// Keyset variant: posts strictly older than `before` (timestamp with
    /// id tie-break), newest first. `None` means the newest page.
    async fn list_posts_before(
        &self,
        before: Option<(DateTime<Utc>, Uuid)>,
        limit: u32,
    ) -> Result<Vec<Post>>;

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>>;

    async fn create_post(&self, new_post: &NewPost) -> Result<Post>;

    async fn delete_post(&self, id: Uuid) -> Result<()>;

    /// Top-level comments for a post, each with its immediate replies
    /// embedded one level deep.
    async fn list_top_level_comments(&self, post_id: Uuid) -> Result<Vec<Comment>>;

    /// Immediate children of one comment, without further nesting.
    async fn list_replies(&self, comment_id: Uuid) -> Result<Vec<Comment>>;

    async fn create_comment(&self, new_comment: &NewComment) -> Result<Comment>;

    async fn upsert_vote(&self, post_id: Uuid, user_id: Uuid, value: VoteValue) -> Result<()>;

    async fn get_my_vote(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<Vote>>;

    /// Case-insensitive substring match on group name.
    async fn search_groups(&self, term: &str) -> Result<Vec<Group>>;

    /// Uploads a local image and returns its remote reference.
    async fn upload_image(&self, image: &LocalImage) -> Result<String>;
}
