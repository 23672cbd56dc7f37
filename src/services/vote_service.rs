use std::sync::Arc;

use uuid::Uuid;

use crate::auth::AuthState;
use crate::backend::Backend;
use crate::cache::{QueryCache, QueryKey};
use crate::error::Result;
use crate::models::{Post, Vote, VoteSummary, VoteValue};

/// Net score and viewer state from raw vote rows. The score of a post
/// nobody voted on is 0, never absent.
pub fn aggregate(votes: &[Vote], viewer_id: Uuid) -> VoteSummary {
    let score = votes
        .iter()
        .map(|vote| i64::from(i16::from(vote.value)))
        .sum();
    let viewer_vote = votes
        .iter()
        .find(|vote| vote.user_id == viewer_id)
        .map(|vote| vote.value);

    VoteSummary { score, viewer_vote }
}

/// Same summary when the backend already delivered the aggregated sum.
pub fn summarize(post: &Post, my_vote: Option<&Vote>) -> VoteSummary {
    VoteSummary {
        score: post.score,
        viewer_vote: my_vote.map(|vote| vote.value),
    }
}

pub struct VoteService<B> {
    backend: Arc<B>,
    cache: Arc<QueryCache>,
    auth: Arc<AuthState>,
}

impl<B: Backend> VoteService<B> {
    pub fn new(backend: Arc<B>, cache: Arc<QueryCache>, auth: Arc<AuthState>) -> Self {
        Self {
            backend,
            cache,
            auth,
        }
    }

    /// The signed-in user's vote on a post, memoized per post.
    pub async fn my_vote(&self, post_id: Uuid) -> Result<Option<Vote>> {
        let user_id = self.auth.current()?.user_id;
        self.cache
            .get_or_fetch(QueryKey::MyVote(post_id), || async {
                self.backend.get_my_vote(post_id, user_id).await
            })
            .await
    }

    /// Upserts the (post, user) row to `value` and invalidates every query
    /// keyed by this post so the aggregate and viewer vote recompute on the
    /// next read. Re-casting the same value stays a no-op upsert; there is
    /// no toggle-off. No optimistic state is kept, so nothing rolls back
    /// on failure.
    pub async fn cast_vote(&self, post_id: Uuid, value: VoteValue) -> Result<()> {
        let user_id = self.auth.current()?.user_id;
        self.backend.upsert_vote(post_id, user_id, value).await?;
        tracing::debug!(%post_id, value = i16::from(value), "vote cast");

        self.cache.invalidate(&QueryKey::Posts);
        self.cache.invalidate(&QueryKey::Post(post_id));
        self.cache.invalidate(&QueryKey::MyVote(post_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use crate::backend::InMemoryBackend;
    use chrono::Utc;

    fn service(user_id: Uuid) -> (Arc<InMemoryBackend>, VoteService<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new(user_id));
        let cache = Arc::new(QueryCache::new());
        let auth = Arc::new(AuthState::signed_in(Session {
            user_id,
            access_token: "token".to_string(),
        }));
        (backend.clone(), VoteService::new(backend, cache, auth))
    }

    #[test]
    fn aggregate_defaults_to_zero() {
        let viewer = Uuid::new_v4();
        let summary = aggregate(&[], viewer);
        assert_eq!(summary.score, 0);
        assert_eq!(summary.viewer_vote, None);
    }

    #[test]
    fn aggregate_sums_and_finds_viewer_vote() {
        let viewer = Uuid::new_v4();
        let post_id = Uuid::new_v4();
        let votes = vec![
            Vote {
                post_id,
                user_id: viewer,
                value: VoteValue::Down,
            },
            Vote {
                post_id,
                user_id: Uuid::new_v4(),
                value: VoteValue::Up,
            },
            Vote {
                post_id,
                user_id: Uuid::new_v4(),
                value: VoteValue::Up,
            },
        ];

        let summary = aggregate(&votes, viewer);
        assert_eq!(summary.score, 1);
        assert_eq!(summary.viewer_vote, Some(VoteValue::Down));
    }

    #[tokio::test]
    async fn casting_twice_leaves_one_row() {
        let user_id = Uuid::new_v4();
        let (backend, service) = service(user_id);
        let group = backend.seed_group("rust", None);
        let post_id = backend.seed_post("hello", group.id, Utc::now());

        service.cast_vote(post_id, VoteValue::Up).await.unwrap();
        service.cast_vote(post_id, VoteValue::Up).await.unwrap();

        let rows = backend.vote_rows(post_id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, VoteValue::Up);
        assert_eq!(rows[0].user_id, user_id);
    }

    #[tokio::test]
    async fn switching_vote_updates_the_row() {
        let user_id = Uuid::new_v4();
        let (backend, service) = service(user_id);
        let group = backend.seed_group("rust", None);
        let post_id = backend.seed_post("hello", group.id, Utc::now());

        service.cast_vote(post_id, VoteValue::Up).await.unwrap();
        service.cast_vote(post_id, VoteValue::Down).await.unwrap();

        let rows = backend.vote_rows(post_id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, VoteValue::Down);
    }

    #[tokio::test]
    async fn my_vote_is_memoized_until_a_vote_invalidates_it() {
        let user_id = Uuid::new_v4();
        let (backend, service) = service(user_id);
        let group = backend.seed_group("rust", None);
        let post_id = backend.seed_post("hello", group.id, Utc::now());

        assert!(service.my_vote(post_id).await.unwrap().is_none());
        assert!(service.my_vote(post_id).await.unwrap().is_none());
        assert_eq!(backend.call_count("get_my_vote"), 1);

        service.cast_vote(post_id, VoteValue::Up).await.unwrap();

        let vote = service.my_vote(post_id).await.unwrap().unwrap();
        assert_eq!(vote.value, VoteValue::Up);
        assert_eq!(backend.call_count("get_my_vote"), 2);
    }

    #[tokio::test]
    async fn cast_vote_requires_a_session() {
        let user_id = Uuid::new_v4();
        let backend = Arc::new(InMemoryBackend::new(user_id));
        let service = VoteService::new(
            backend.clone(),
            Arc::new(QueryCache::new()),
            Arc::new(AuthState::new()),
        );

        let result = service.cast_vote(Uuid::new_v4(), VoteValue::Up).await;
        assert!(matches!(
            result,
            Err(crate::error::AppError::Authentication(_))
        ));
        assert!(backend.calls().is_empty());
    }
}
