use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::Group;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub user_id: Uuid,
    pub group: Group,
    /// Aggregated by the backend; never written by the client.
    #[serde(default)]
    pub score: i64,
    /// Aggregated by the backend; never written by the client.
    #[serde(default)]
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

/// An image picked on the device, not yet uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

// Create post request. The author id comes from the backend's auth
// context, never from the client.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct NewPost {
    #[validate(length(min = 1, max = 300, message = "title required"))]
    pub title: String,
    pub description: Option<String>,
    pub group_id: Uuid,
    pub image: Option<String>,
}
