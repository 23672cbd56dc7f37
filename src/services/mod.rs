pub mod comment_service;
pub mod composer_service;
pub mod feed_service;
pub mod group_service;
pub mod post_service;
pub mod vote_service;
