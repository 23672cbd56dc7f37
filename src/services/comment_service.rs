use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::backend::Backend;
use crate::cache::{QueryCache, QueryKey};
use crate::error::{AppError, Result};
use crate::models::{Comment, NewComment};

/// One comment in the thread arena. `children` keeps backend order;
/// `children_loaded` distinguishes "no replies" from "not fetched yet".
#[derive(Debug, Clone)]
pub struct CommentNode {
    pub comment: Comment,
    pub children: Vec<Uuid>,
    pub depth: u32,
    pub children_loaded: bool,
}

/// Arena of comment nodes keyed by id. Nodes hold child id lists rather
/// than owning their subtrees, which keeps the model serializable and
/// lets a failed subtree fetch leave every other node intact.
#[derive(Debug)]
pub struct CommentThread {
    post_id: Uuid,
    nodes: HashMap<Uuid, CommentNode>,
    top_level: Vec<Uuid>,
    max_depth: u32,
}

impl CommentThread {
    fn new(post_id: Uuid, max_depth: u32) -> Self {
        Self {
            post_id,
            nodes: HashMap::new(),
            top_level: Vec::new(),
            max_depth,
        }
    }

    pub fn post_id(&self) -> Uuid {
        self.post_id
    }

    /// Top-level comment ids in backend order.
    pub fn top_level(&self) -> &[Uuid] {
        &self.top_level
    }

    pub fn node(&self, id: Uuid) -> Option<&CommentNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the UI should show a "show replies" control for this
    /// comment. False once replies are loaded, and always false at the
    /// depth cap: rendering stops offering expansion there to bound
    /// render cost. This is display policy only; fetches are always one
    /// level at a time.
    pub fn offers_expansion(&self, id: Uuid) -> bool {
        match self.nodes.get(&id) {
            Some(node) => !node.children_loaded && node.depth < self.max_depth,
            None => false,
        }
    }

    /// Attaches `comment` under `parent` (or top-level), dropping rows
    /// that do not belong where the backend said they would.
    fn attach(&mut self, parent: Option<Uuid>, comment: Comment, children_loaded: bool) {
        if comment.post_id != self.post_id {
            tracing::warn!(comment_id = %comment.id, "dropping comment from another post");
            return;
        }

        let depth = match parent {
            None => 0,
            Some(parent_id) => match self.nodes.get(&parent_id) {
                Some(parent_node) => parent_node.depth + 1,
                None => {
                    tracing::warn!(comment_id = %comment.id, "dropping reply with unknown parent");
                    return;
                }
            },
        };

        let id = comment.id;
        // Replies already in the arena keep their loaded subtrees.
        if self.nodes.contains_key(&id) {
            return;
        }

        let mut node = CommentNode {
            comment,
            children: Vec::new(),
            depth,
            children_loaded,
        };
        let embedded = std::mem::take(&mut node.comment.replies);
        self.nodes.insert(id, node);

        match parent {
            None => self.top_level.push(id),
            Some(parent_id) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                    parent_node.children.push(id);
                }
            }
        }

        for reply in embedded {
            if reply.parent_id != Some(id) {
                tracing::warn!(reply_id = %reply.id, "dropping embedded reply with wrong parent");
                continue;
            }
            self.attach(Some(id), reply, false);
        }
    }
}

pub struct CommentService<B> {
    backend: Arc<B>,
    cache: Arc<QueryCache>,
    max_depth: u32,
}

impl<B: Backend> CommentService<B> {
    pub fn new(backend: Arc<B>, cache: Arc<QueryCache>, max_depth: u32) -> Self {
        Self {
            backend,
            cache,
            max_depth,
        }
    }

    /// Builds the thread for a post: top-level comments at depth 0 with
    /// their one-join replies attached at depth 1. A failure here is
    /// terminal for the whole detail view.
    pub async fn load_top_level(&self, post_id: Uuid) -> Result<CommentThread> {
        let comments: Vec<Comment> = self
            .cache
            .get_or_fetch(QueryKey::PostComments(post_id), || async {
                self.backend.list_top_level_comments(post_id).await
            })
            .await?;

        let mut thread = CommentThread::new(post_id, self.max_depth);
        for comment in comments {
            // The join delivered this comment's children, so its reply
            // state is known; the embedded replies' own children are not.
            thread.attach(None, comment, true);
        }
        Ok(thread)
    }

    /// Fetches the immediate children of `comment_id` and attaches them
    /// one level deeper. Returns the attached ids in backend order. At
    /// the depth cap this is a no-fetch no-op. A failed fetch leaves the
    /// thread untouched, so siblings keep rendering.
    pub async fn load_replies(
        &self,
        thread: &mut CommentThread,
        comment_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        let node = thread
            .node(comment_id)
            .ok_or_else(|| AppError::NotFound("Comment not in thread".to_string()))?;

        if node.children_loaded {
            return Ok(node.children.clone());
        }
        if node.depth >= thread.max_depth {
            return Ok(Vec::new());
        }

        let replies: Vec<Comment> = self
            .cache
            .get_or_fetch(QueryKey::CommentReplies(comment_id), || async {
                self.backend.list_replies(comment_id).await
            })
            .await?;

        for reply in replies {
            if reply.parent_id != Some(comment_id) {
                tracing::warn!(reply_id = %reply.id, "dropping reply with wrong parent");
                continue;
            }
            thread.attach(Some(comment_id), reply, false);
        }

        let node = thread
            .nodes
            .get_mut(&comment_id)
            .ok_or_else(|| AppError::NotFound("Comment not in thread".to_string()))?;
        node.children_loaded = true;
        Ok(node.children.clone())
    }

    /// Creates a comment (top-level or reply) after a local non-empty
    /// check, then invalidates the post's comment queries and the post
    /// itself so the comment count recomputes.
    pub async fn create_comment(
        &self,
        post_id: Uuid,
        parent_id: Option<Uuid>,
        content: &str,
    ) -> Result<Comment> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("comment required".to_string()));
        }

        let comment = self
            .backend
            .create_comment(&NewComment {
                post_id,
                parent_id,
                content: content.to_string(),
            })
            .await?;

        self.cache.invalidate(&QueryKey::PostComments(post_id));
        if let Some(parent_id) = parent_id {
            self.cache.invalidate(&QueryKey::CommentReplies(parent_id));
        }
        self.cache.invalidate(&QueryKey::Post(post_id));
        Ok(comment)
    }
}
