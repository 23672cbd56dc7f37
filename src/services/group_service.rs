use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::Backend;
use crate::cache::{QueryCache, QueryKey};
use crate::error::Result;
use crate::models::Group;

/// One issued search. The sequence number pins the result to the input
/// state it was requested for.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    term: String,
    seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Results for the term the user is still looking at.
    Current(Vec<Group>),
    /// The input moved on while this search was in flight; the caller
    /// must not display these results.
    Superseded,
}

/// Substring search over group names, re-issued on every input change.
/// Matching is case-insensitive and runs backend-side; results are
/// memoized per normalized term. Completions are checked against the
/// latest issued sequence so a slow response for an old term can never
/// overwrite the current one.
pub struct GroupFilter<B> {
    backend: Arc<B>,
    cache: Arc<QueryCache>,
    latest: AtomicU64,
}

impl<B: Backend> GroupFilter<B> {
    pub fn new(backend: Arc<B>, cache: Arc<QueryCache>) -> Self {
        Self {
            backend,
            cache,
            latest: AtomicU64::new(0),
        }
    }

    /// Registers a new input value. Every previously issued request is
    /// superseded from this point on.
    pub fn issue(&self, term: &str) -> SearchRequest {
        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        SearchRequest {
            term: term.trim().to_lowercase(),
            seq,
        }
    }

    pub async fn run(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let term = request.term.clone();
        let groups = self
            .cache
            .get_or_fetch(QueryKey::Groups(term.clone()), || async {
                self.backend.search_groups(&term).await
            })
            .await?;

        if request.seq != self.latest.load(Ordering::SeqCst) {
            tracing::debug!(term = %request.term, "search superseded");
            return Ok(SearchOutcome::Superseded);
        }
        Ok(SearchOutcome::Current(groups))
    }

    pub async fn search(&self, term: &str) -> Result<SearchOutcome> {
        let request = self.issue(term);
        self.run(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use uuid::Uuid;

    fn filter_with_groups(names: &[&str]) -> (Arc<InMemoryBackend>, GroupFilter<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new(Uuid::new_v4()));
        for name in names {
            backend.seed_group(name, None);
        }
        let filter = GroupFilter::new(backend.clone(), Arc::new(QueryCache::new()));
        (backend, filter)
    }

    fn names(outcome: SearchOutcome) -> Vec<String> {
        match outcome {
            SearchOutcome::Current(groups) => groups.into_iter().map(|g| g.name).collect(),
            SearchOutcome::Superseded => panic!("expected current results"),
        }
    }

    #[tokio::test]
    async fn matches_are_case_insensitive_substrings() {
        let (_, filter) = filter_with_groups(&["Rust", "Android", "gamedev"]);

        let found = names(filter.search("a").await.unwrap());
        assert_eq!(found, ["Android", "gamedev"]);

        let found = names(filter.search("AND").await.unwrap());
        assert_eq!(found, ["Android"]);

        let found = names(filter.search("zzz").await.unwrap());
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn a_superseded_search_does_not_win() {
        let (_, filter) = filter_with_groups(&["alpha", "ab", "abc"]);

        // "a" is issued first but resolves after "ab" was issued.
        let slow = filter.issue("a");
        let fast = filter.issue("ab");

        let fast_outcome = filter.run(&fast).await.unwrap();
        assert_eq!(names(fast_outcome), ["ab", "abc"]);

        let slow_outcome = filter.run(&slow).await.unwrap();
        assert_eq!(slow_outcome, SearchOutcome::Superseded);
    }

    #[tokio::test]
    async fn repeated_terms_are_memoized() {
        let (backend, filter) = filter_with_groups(&["alpha"]);

        filter.search("al").await.unwrap();
        filter.search("al").await.unwrap();
        // Normalization folds case into the same cache key.
        filter.search("AL").await.unwrap();

        assert_eq!(backend.call_count("search_groups"), 1);
    }

    #[tokio::test]
    async fn empty_term_lists_all_groups() {
        let (_, filter) = filter_with_groups(&["one", "two"]);
        let found = names(filter.search("").await.unwrap());
        assert_eq!(found.len(), 2);
    }
}
