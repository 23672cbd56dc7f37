use chrono::{Duration, Utc};
use threadfeed::Client;
use threadfeed::auth::{AuthState, Session};
use threadfeed::backend::InMemoryBackend;
use threadfeed::config::Config;
use threadfeed::models::VoteValue;
use threadfeed::services::group_service::SearchOutcome;
use threadfeed::services::vote_service;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Demo walk-through against a seeded in-memory backend: pages the feed,
/// opens a comment thread, expands a reply subtree, casts a vote and
/// searches groups. Point `RestBackend` at a real API for the same flows
/// over HTTP.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threadfeed=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_default();
    let user_id = Uuid::new_v4();

    let backend = InMemoryBackend::new(user_id);
    let rust = backend.seed_group("rust", None);
    let gamedev = backend.seed_group("gamedev", None);
    let now = Utc::now();
    let post_id = backend.seed_post("Lifetimes finally clicked", rust.id, now);
    backend.seed_post("Show and tell: my first roguelike", gamedev.id, now - Duration::minutes(5));
    backend.seed_post("Borrow checker appreciation thread", rust.id, now - Duration::minutes(9));
    let top = backend.seed_comment(post_id, None, "Great writeup");
    let reply = backend.seed_comment(post_id, Some(top), "Agreed, the diagrams helped");
    backend.seed_comment(post_id, Some(reply), "Which diagrams?");

    let auth = AuthState::signed_in(Session {
        user_id,
        access_token: "demo-token".to_string(),
    });
    let client = Client::new(backend, auth, config);

    // Page through the feed the way the home screen would.
    let mut feed = client.feed();
    while feed.has_more() {
        feed.next_page().await?;
    }
    for post in feed.posts() {
        tracing::info!(
            group = %post.group.name,
            score = post.score,
            comments = post.comment_count,
            "{}",
            post.title
        );
    }

    // Open the detail screen for the newest post.
    let votes = client.votes();
    let comments = client.comments();
    let post = client.posts().get_post(post_id).await?;
    let my_vote = votes.my_vote(post.id).await?;
    let summary = vote_service::summarize(&post, my_vote.as_ref());
    tracing::info!(score = summary.score, vote = ?summary.viewer_vote, "viewing {}", post.title);

    let mut thread = comments.load_top_level(post.id).await?;
    tracing::info!(top_level = thread.top_level().len(), "comment thread loaded");
    let expanded = comments.load_replies(&mut thread, reply).await?;
    tracing::info!(replies = expanded.len(), "expanded one subtree");

    // Upvote and watch the aggregate recompute on the next read.
    votes.cast_vote(post.id, VoteValue::Up).await?;
    let post = client.posts().get_post(post_id).await?;
    let my_vote = votes.my_vote(post.id).await?;
    let summary = vote_service::summarize(&post, my_vote.as_ref());
    tracing::info!(score = summary.score, vote = ?summary.viewer_vote, "after voting");

    // The group selector's search box.
    if let SearchOutcome::Current(groups) = client.groups().search("ru").await? {
        for group in groups {
            tracing::info!(group = %group.name, "search hit");
        }
    }

    Ok(())
}
