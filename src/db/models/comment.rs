//! Session comment models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct SessionComment {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub session_id: String,
}

/// Comment joined with its author's username for list views
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommentWithAuthor {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub session_id: String,
    pub author_username: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}
