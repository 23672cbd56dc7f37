pub mod auth;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

use std::sync::Arc;

use crate::auth::AuthState;
use crate::backend::Backend;
use crate::cache::QueryCache;
use crate::config::Config;
use crate::services::comment_service::CommentService;
use crate::services::composer_service::PostComposer;
use crate::services::feed_service::FeedPaginator;
use crate::services::group_service::GroupFilter;
use crate::services::post_service::PostService;
use crate::services::vote_service::VoteService;

/// Everything the screen layer holds: one backend, one query cache, one
/// auth state. Screens are thin glue: they take a service from here,
/// render what it returns and forward user actions back into it.
pub struct Client<B> {
    pub backend: Arc<B>,
    pub cache: Arc<QueryCache>,
    pub auth: Arc<AuthState>,
    pub config: Arc<Config>,
}

impl<B> Clone for Client<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            cache: self.cache.clone(),
            auth: self.auth.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B: Backend> Client<B> {
    pub fn new(backend: B, auth: AuthState, config: Config) -> Self {
        Self {
            backend: Arc::new(backend),
            cache: Arc::new(QueryCache::new()),
            auth: Arc::new(auth),
            config: Arc::new(config),
        }
    }

    pub fn feed(&self) -> FeedPaginator<B> {
        FeedPaginator::new(
            self.backend.clone(),
            self.cache.clone(),
            self.config.feed_page_size,
        )
    }

    pub fn posts(&self) -> PostService<B> {
        PostService::new(self.backend.clone(), self.cache.clone())
    }

    pub fn comments(&self) -> CommentService<B> {
        CommentService::new(
            self.backend.clone(),
            self.cache.clone(),
            self.config.max_thread_depth,
        )
    }

    pub fn votes(&self) -> VoteService<B> {
        VoteService::new(self.backend.clone(), self.cache.clone(), self.auth.clone())
    }

    pub fn composer(&self) -> PostComposer<B> {
        PostComposer::new(self.backend.clone(), self.cache.clone())
    }

    pub fn groups(&self) -> GroupFilter<B> {
        GroupFilter::new(self.backend.clone(), self.cache.clone())
    }
}
