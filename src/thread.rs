//! Reply-chain reconstruction for comments.

use crate::error::{AppError, Result};
use crate::models::Comment;
use crate::store::RecordAccessor;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A comment with its chain of replied-to ancestors attached as `parent`.
///
/// The commented-on target (`post`/`hotel`) is not carried over.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResolvedComment {
    pub id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub comment_type: i32,
    pub level: i32,
    pub follow: Option<i64>,
    pub account: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<Box<ResolvedComment>>,
}

impl ResolvedComment {
    fn new(comment: Comment, parent: Option<Box<ResolvedComment>>) -> Self {
        Self {
            id: comment.id,
            content: comment.content,
            comment_type: comment.comment_type,
            level: comment.level,
            follow: comment.follow,
            account: comment.account,
            created_at: comment.created_at,
            parent,
        }
    }

    /// Number of ancestors above this comment.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent.as_deref();
        while let Some(parent) = current {
            depth += 1;
            current = parent.parent.as_deref();
        }
        depth
    }
}

/// Follows `comment`'s `follow` links up to the thread root.
///
/// One fetch per ancestor. A link to a comment that no longer exists ends the
/// chain there. A link back to a comment already on the chain fails with
/// [`AppError::DataIntegrity`].
pub async fn resolve_ancestors(
    store: &dyn RecordAccessor,
    comment: Comment,
) -> Result<ResolvedComment> {
    let mut visited = HashSet::from([comment.id]);
    let mut next = comment.follow;
    let mut chain = vec![comment];

    while let Some(parent_id) = next {
        if !visited.insert(parent_id) {
            return Err(AppError::DataIntegrity(format!(
                "comment {} follows a cycle back to comment {}",
                chain[0].id, parent_id
            )));
        }

        match store.fetch_comment(parent_id).await {
            Ok(parent) => {
                next = parent.follow;
                chain.push(parent);
            }
            Err(e) if e.is_not_found() => {
                debug!(
                    "Comment {} follows missing comment {}, ending chain",
                    chain[chain.len() - 1].id,
                    parent_id
                );
                break;
            }
            Err(e) => return Err(e),
        }
    }

    let mut resolved: Option<Box<ResolvedComment>> = None;
    for comment in chain.into_iter().rev() {
        resolved = Some(Box::new(ResolvedComment::new(comment, resolved)));
    }

    resolved
        .map(|root| *root)
        .ok_or_else(|| AppError::Internal("empty comment chain".to_string()))
}
