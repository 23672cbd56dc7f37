use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::{AppError, Result};
use crate::models::{Comment, Group, LocalImage, NewComment, NewPost, Post, Vote, VoteValue};

#[derive(Debug, Clone)]
struct PostRecord {
    id: Uuid,
    title: String,
    description: Option<String>,
    image: Option<String>,
    user_id: Uuid,
    group_id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CommentRecord {
    id: Uuid,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    user_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    groups: Vec<Group>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    votes: HashMap<(Uuid, Uuid), VoteValue>,
}

/// Backend with everything in memory, used by tests and the demo binary.
/// Vote sums and comment counts are computed on read, the same way the
/// real backend's join aggregation delivers them. Individual operations
/// can be made to fail to exercise error paths, and every backend call is
/// recorded so tests can assert how many network round trips happened.
#[derive(Debug)]
pub struct InMemoryBackend {
    /// The authenticated user the call context attaches to writes.
    user_id: Uuid,
    store: Mutex<Store>,
    calls: Mutex<Vec<&'static str>>,
    fail_ops: Mutex<HashSet<&'static str>>,
}

impl InMemoryBackend {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            store: Mutex::new(Store::default()),
            calls: Mutex::new(Vec::new()),
            fail_ops: Mutex::new(HashSet::new()),
        }
    }

    pub fn seed_group(&self, name: &str, image: Option<&str>) -> Group {
        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            image: image.map(str::to_string),
        };
        self.store.lock().unwrap().groups.push(group.clone());
        group
    }

    pub fn seed_post(&self, title: &str, group_id: Uuid, created_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.store.lock().unwrap().posts.push(PostRecord {
            id,
            title: title.to_string(),
            description: None,
            image: None,
            user_id: self.user_id,
            group_id,
            created_at,
        });
        id
    }

    pub fn seed_comment(&self, post_id: Uuid, parent_id: Option<Uuid>, content: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store.lock().unwrap().comments.push(CommentRecord {
            id,
            post_id,
            parent_id,
            user_id: self.user_id,
            content: content.to_string(),
            created_at: Utc::now(),
        });
        id
    }

    /// Makes the named operation fail with an upstream error until cleared.
    pub fn fail_op(&self, op: &'static str) {
        self.fail_ops.lock().unwrap().insert(op);
    }

    pub fn clear_failures(&self) {
        self.fail_ops.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: &'static str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn vote_rows(&self, post_id: Uuid) -> Vec<Vote> {
        self.store
            .lock()
            .unwrap()
            .votes
            .iter()
            .filter(|((post, _), _)| *post == post_id)
            .map(|((post, user), value)| Vote {
                post_id: *post,
                user_id: *user,
                value: *value,
            })
            .collect()
    }

    pub fn post_count(&self) -> usize {
        self.store.lock().unwrap().posts.len()
    }

    fn record(&self, op: &'static str) -> Result<()> {
        if self.fail_ops.lock().unwrap().contains(op) {
            return Err(AppError::upstream(format!("{op} failed")));
        }
        self.calls.lock().unwrap().push(op);
        Ok(())
    }
}

impl Store {
    fn group(&self, group_id: Uuid) -> Result<Group> {
        self.groups
            .iter()
            .find(|g| g.id == group_id)
            .cloned()
            .ok_or_else(|| AppError::upstream(format!("Unknown group {group_id}")))
    }

    fn materialize_post(&self, record: &PostRecord) -> Result<Post> {
        let score = self
            .votes
            .iter()
            .filter(|((post, _), _)| *post == record.id)
            .map(|(_, value)| i64::from(i16::from(*value)))
            .sum();
        let comment_count = self
            .comments
            .iter()
            .filter(|c| c.post_id == record.id)
            .count() as i64;

        Ok(Post {
            id: record.id,
            title: record.title.clone(),
            description: record.description.clone(),
            image: record.image.clone(),
            user_id: record.user_id,
            group: self.group(record.group_id)?,
            score,
            comment_count,
            created_at: record.created_at,
        })
    }

    /// Newest first, id descending breaking timestamp ties, matching the
    /// order the keyset filter pages by.
    fn ordered_posts(&self) -> Vec<&PostRecord> {
        let mut records: Vec<&PostRecord> = self.posts.iter().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        records
    }

    fn materialize_comment(&self, record: &CommentRecord, with_replies: bool) -> Comment {
        let replies = if with_replies {
            self.comments
                .iter()
                .filter(|c| c.parent_id == Some(record.id))
                .map(|c| self.materialize_comment(c, false))
                .collect()
        } else {
            Vec::new()
        };

        Comment {
            id: record.id,
            post_id: record.post_id,
            parent_id: record.parent_id,
            user_id: record.user_id,
            content: record.content.clone(),
            upvotes: 0,
            created_at: record.created_at,
            replies,
        }
    }
}

impl Backend for InMemoryBackend {
    async fn list_posts(&self, limit: u32, offset: u32) -> Result<Vec<Post>> {
        self.record("list_posts")?;
        let store = self.store.lock().unwrap();
        store
            .ordered_posts()
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|record| store.materialize_post(record))
            .collect()
    }

    async fn list_posts_before(
        &self,
        before: Option<(DateTime<Utc>, Uuid)>,
        limit: u32,
    ) -> Result<Vec<Post>> {
        self.record("list_posts_before")?;
        let store = self.store.lock().unwrap();
        store
            .ordered_posts()
            .into_iter()
            .filter(|record| match before {
                Some((created_at, id)) => {
                    record.created_at < created_at
                        || (record.created_at == created_at && record.id < id)
                }
                None => true,
            })
            .take(limit as usize)
            .map(|record| store.materialize_post(record))
            .collect()
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        self.record("get_post")?;
        let store = self.store.lock().unwrap();
        store
            .posts
            .iter()
            .find(|p| p.id == id)
            .map(|record| store.materialize_post(record))
            .transpose()
    }

    async fn create_post(&self, new_post: &NewPost) -> Result<Post> {
        self.record("create_post")?;
        let mut store = self.store.lock().unwrap();
        store.group(new_post.group_id)?;

        let record = PostRecord {
            id: Uuid::new_v4(),
            title: new_post.title.clone(),
            description: new_post.description.clone(),
            image: new_post.image.clone(),
            user_id: self.user_id,
            group_id: new_post.group_id,
            created_at: Utc::now(),
        };
        store.posts.push(record.clone());
        store.materialize_post(&record)
    }

    async fn delete_post(&self, id: Uuid) -> Result<()> {
        self.record("delete_post")?;
        let mut store = self.store.lock().unwrap();
        store.posts.retain(|p| p.id != id);
        // Cascade, as the real backend's foreign keys would.
        store.comments.retain(|c| c.post_id != id);
        store.votes.retain(|(post, _), _| *post != id);
        Ok(())
    }

    async fn list_top_level_comments(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        self.record("list_top_level_comments")?;
        let store = self.store.lock().unwrap();
        Ok(store
            .comments
            .iter()
            .filter(|c| c.post_id == post_id && c.parent_id.is_none())
            .map(|c| store.materialize_comment(c, true))
            .collect())
    }

    async fn list_replies(&self, comment_id: Uuid) -> Result<Vec<Comment>> {
        self.record("list_replies")?;
        let store = self.store.lock().unwrap();
        Ok(store
            .comments
            .iter()
            .filter(|c| c.parent_id == Some(comment_id))
            .map(|c| store.materialize_comment(c, false))
            .collect())
    }

    async fn create_comment(&self, new_comment: &NewComment) -> Result<Comment> {
        self.record("create_comment")?;
        let mut store = self.store.lock().unwrap();
        let record = CommentRecord {
            id: Uuid::new_v4(),
            post_id: new_comment.post_id,
            parent_id: new_comment.parent_id,
            user_id: self.user_id,
            content: new_comment.content.clone(),
            created_at: Utc::now(),
        };
        store.comments.push(record.clone());
        Ok(store.materialize_comment(&record, false))
    }

    async fn upsert_vote(&self, post_id: Uuid, user_id: Uuid, value: VoteValue) -> Result<()> {
        self.record("upsert_vote")?;
        self.store
            .lock()
            .unwrap()
            .votes
            .insert((post_id, user_id), value);
        Ok(())
    }

    async fn get_my_vote(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<Vote>> {
        self.record("get_my_vote")?;
        Ok(self
            .store
            .lock()
            .unwrap()
            .votes
            .get(&(post_id, user_id))
            .map(|value| Vote {
                post_id,
                user_id,
                value: *value,
            }))
    }

    async fn search_groups(&self, term: &str) -> Result<Vec<Group>> {
        self.record("search_groups")?;
        let needle = term.to_lowercase();
        Ok(self
            .store
            .lock()
            .unwrap()
            .groups
            .iter()
            .filter(|g| g.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn upload_image(&self, image: &LocalImage) -> Result<String> {
        self.record("upload_image")?;
        Ok(format!("mem://images/{}/{}", Uuid::new_v4(), image.file_name))
    }
}
