use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum VoteValue {
    Up,
    Down,
}

impl From<VoteValue> for i16 {
    fn from(value: VoteValue) -> i16 {
        match value {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i16> for VoteValue {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(format!("Invalid vote value: {}", other)),
        }
    }
}

/// One row per (post, user); casting again upserts the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub value: VoteValue,
}

/// What the footer of a post card renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteSummary {
    pub score: i64,
    pub viewer_vote: Option<VoteValue>,
}
