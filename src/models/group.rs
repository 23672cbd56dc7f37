use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A community that posts belong to. Read-only from the client; name
/// uniqueness is the backend's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
}
