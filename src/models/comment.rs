use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    /// None for a top-level comment. A parent always belongs to the same
    /// post; depth is computed in the thread arena, never stored.
    pub parent_id: Option<Uuid>,
    pub user_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub upvotes: i64,
    pub created_at: DateTime<Utc>,
    /// Immediate children delivered by the backend's one-level join.
    /// Deeper levels are fetched lazily, one level at a time.
    #[serde(default)]
    pub replies: Vec<Comment>,
}

// Create comment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
}
