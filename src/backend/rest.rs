use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthState;
use crate::backend::Backend;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Comment, Group, LocalImage, NewComment, NewPost, Post, Vote, VoteValue};

/// Embedded-resource select mirroring what the feed renders: the owning
/// group, the vote sum and the comment count, all aggregated server-side.
const POST_SELECT: &str = "*,group:groups(*),upvotes(sum:value.sum()),comment_count:comments(count)";
const TOP_LEVEL_COMMENT_SELECT: &str = "*,replies:comments(*)";

/// PostgREST-style backend over HTTP. Every request carries the project
/// API key plus the session's bearer token, runs under a bounded timeout,
/// and idempotent reads get a bounded retry with backoff. Writes are sent
/// exactly once.
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    storage_bucket: String,
    auth: Arc<AuthState>,
    max_read_retries: u32,
    retry_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct SumRow {
    sum: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct PostRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    image: Option<String>,
    user_id: Uuid,
    group: Group,
    #[serde(default)]
    upvotes: Vec<SumRow>,
    #[serde(default)]
    comment_count: Vec<CountRow>,
    created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Post {
        Post {
            id: row.id,
            title: row.title,
            description: row.description,
            image: row.image,
            user_id: row.user_id,
            group: row.group,
            // A post with no votes aggregates to null; it renders as 0.
            score: row.upvotes.first().and_then(|r| r.sum).unwrap_or(0),
            comment_count: row.comment_count.first().map(|r| r.count).unwrap_or(0),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    user_id: Uuid,
    content: String,
    #[serde(default)]
    upvotes: i64,
    created_at: DateTime<Utc>,
    #[serde(default)]
    replies: Vec<CommentRow>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Comment {
        Comment {
            id: row.id,
            post_id: row.post_id,
            parent_id: row.parent_id,
            user_id: row.user_id,
            content: row.content,
            upvotes: row.upvotes,
            created_at: row.created_at,
            replies: row.replies.into_iter().map(Comment::from).collect(),
        }
    }
}

impl RestBackend {
    pub fn new(config: &Config, auth: Arc<AuthState>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            storage_bucket: config.storage_bucket.clone(),
            auth,
            max_read_retries: config.max_read_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = match self.auth.current() {
            Ok(session) => session.access_token,
            Err(_) => self.api_key.clone(),
        };
        builder.header("apikey", &self.api_key).bearer_auth(bearer)
    }

    async fn send<T: DeserializeOwned>(&self, op: &'static str, request: RequestBuilder) -> Result<T> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("{op}: not found")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: Some(status),
                message: format!("{op}: {body}"),
            });
        }
        Ok(response.json().await?)
    }

    /// Reads are idempotent, so transient failures are retried with a
    /// growing backoff up to the configured limit.
    async fn send_read<T: DeserializeOwned>(
        &self,
        op: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            let Some(cloned) = request.try_clone() else {
                return self.send(op, request).await;
            };
            match self.send(op, cloned).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.max_read_retries && error.is_retryable() => {
                    attempt += 1;
                    tracing::warn!(op, attempt, %error, "retrying read after transient failure");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Backend for RestBackend {
    async fn list_posts(&self, limit: u32, offset: u32) -> Result<Vec<Post>> {
        let request = self.http.get(self.table_url("posts")).query(&[
            ("select", POST_SELECT.to_string()),
            ("order", "created_at.desc,id.desc".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ]);
        let rows: Vec<PostRow> = self.send_read("list_posts", request).await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn list_posts_before(
        &self,
        before: Option<(DateTime<Utc>, Uuid)>,
        limit: u32,
    ) -> Result<Vec<Post>> {
        let mut request = self.http.get(self.table_url("posts")).query(&[
            ("select", POST_SELECT.to_string()),
            ("order", "created_at.desc,id.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        if let Some((created_at, id)) = before {
            let ts = created_at.to_rfc3339();
            request = request.query(&[(
                "or",
                format!("(created_at.lt.\"{ts}\",and(created_at.eq.\"{ts}\",id.lt.{id}))"),
            )]);
        }
        let rows: Vec<PostRow> = self.send_read("list_posts_before", request).await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        let request = self.http.get(self.table_url("posts")).query(&[
            ("select", POST_SELECT.to_string()),
            ("id", format!("eq.{id}")),
        ]);
        let rows: Vec<PostRow> = self.send_read("get_post", request).await?;
        Ok(rows.into_iter().next().map(Post::from))
    }

    async fn create_post(&self, new_post: &NewPost) -> Result<Post> {
        let request = self
            .http
            .post(self.table_url("posts"))
            .query(&[("select", POST_SELECT)])
            .header("Prefer", "return=representation")
            .json(new_post);
        let rows: Vec<PostRow> = self.send("create_post", request).await?;
        rows.into_iter()
            .next()
            .map(Post::from)
            .ok_or_else(|| AppError::upstream("create_post: empty representation"))
    }

    async fn delete_post(&self, id: Uuid) -> Result<()> {
        let request = self
            .http
            .delete(self.table_url("posts"))
            .query(&[("id", format!("eq.{id}"))]);
        let response = self.authed(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: Some(status),
                message: format!("delete_post: {body}"),
            });
        }
        Ok(())
    }

    async fn list_top_level_comments(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let request = self.http.get(self.table_url("comments")).query(&[
            ("select", TOP_LEVEL_COMMENT_SELECT.to_string()),
            ("post_id", format!("eq.{post_id}")),
            ("parent_id", "is.null".to_string()),
            ("order", "created_at.asc".to_string()),
        ]);
        let rows: Vec<CommentRow> = self.send_read("list_top_level_comments", request).await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn list_replies(&self, comment_id: Uuid) -> Result<Vec<Comment>> {
        let request = self.http.get(self.table_url("comments")).query(&[
            ("select", "*".to_string()),
            ("parent_id", format!("eq.{comment_id}")),
            ("order", "created_at.asc".to_string()),
        ]);
        let rows: Vec<CommentRow> = self.send_read("list_replies", request).await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn create_comment(&self, new_comment: &NewComment) -> Result<Comment> {
        let request = self
            .http
            .post(self.table_url("comments"))
            .header("Prefer", "return=representation")
            .json(new_comment);
        let rows: Vec<CommentRow> = self.send("create_comment", request).await?;
        rows.into_iter()
            .next()
            .map(Comment::from)
            .ok_or_else(|| AppError::upstream("create_comment: empty representation"))
    }

    async fn upsert_vote(&self, post_id: Uuid, user_id: Uuid, value: VoteValue) -> Result<()> {
        let request = self
            .http
            .post(self.table_url("upvotes"))
            .query(&[("on_conflict", "post_id,user_id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({
                "post_id": post_id,
                "user_id": user_id,
                "value": i16::from(value),
            }));
        let response = self.authed(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: Some(status),
                message: format!("upsert_vote: {body}"),
            });
        }
        Ok(())
    }

    async fn get_my_vote(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<Vote>> {
        let request = self.http.get(self.table_url("upvotes")).query(&[
            ("select", "post_id,user_id,value".to_string()),
            ("post_id", format!("eq.{post_id}")),
            ("user_id", format!("eq.{user_id}")),
        ]);
        let rows: Vec<Vote> = self.send_read("get_my_vote", request).await?;
        Ok(rows.into_iter().next())
    }

    async fn search_groups(&self, term: &str) -> Result<Vec<Group>> {
        let request = self.http.get(self.table_url("groups")).query(&[
            ("select", "*".to_string()),
            ("name", format!("ilike.*{term}*")),
            ("order", "name.asc".to_string()),
        ]);
        self.send_read("search_groups", request).await
    }

    async fn upload_image(&self, image: &LocalImage) -> Result<String> {
        let object_path = format!("{}/{}", Uuid::new_v4(), image.file_name);
        let content_type = mime_guess::from_path(&image.file_name).first_or_octet_stream();
        let request = self
            .http
            .post(format!(
                "{}/storage/v1/object/{}/{}",
                self.base_url, self.storage_bucket, object_path
            ))
            .header("Content-Type", content_type.as_ref())
            .body(image.bytes.clone());

        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| AppError::Upload(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upload(format!("{status}: {body}")));
        }

        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.storage_bucket, object_path
        ))
    }
}
