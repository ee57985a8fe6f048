//! Comments attached to a study session.

use tracing::debug;

use super::{fetch_session, is_member_in, SessionService};
use crate::db::{begin_write, CommentWithAuthor, SessionComment, User};
use crate::error::{CoreError, CoreResult};
use crate::validation::validate_comment;

impl SessionService {
    /// Post a comment. Comments are append-only.
    pub async fn add_comment(
        &self,
        session_id: &str,
        author: &User,
        content: &str,
    ) -> CoreResult<SessionComment> {
        let mut tx = begin_write(&self.db).await?;

        fetch_session(&mut tx, session_id).await?;

        validate_comment(content, self.config.comment_max_length)
            .map_err(|e| CoreError::validation("content", e))?;

        if self.config.comments_require_membership
            && !is_member_in(&mut tx, session_id, &author.id).await?
        {
            return Err(CoreError::NotAMember);
        }

        let comment = SessionComment {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.trim().to_string(),
            timestamp: self.clock.now(),
            user_id: author.id.clone(),
            session_id: session_id.to_string(),
        };

        sqlx::query(
            "INSERT INTO session_comments (id, content, timestamp, user_id, session_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.content)
        .bind(comment.timestamp)
        .bind(&comment.user_id)
        .bind(&comment.session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(session_id = %session_id, user_id = %author.id, "Comment added");
        Ok(comment)
    }

    /// Comments on a session, oldest first
    pub async fn list_comments(&self, session_id: &str) -> CoreResult<Vec<CommentWithAuthor>> {
        let comments = sqlx::query_as::<_, CommentWithAuthor>(
            r#"
            SELECT c.id, c.content, c.timestamp, c.user_id, c.session_id,
                   u.username AS author_username
            FROM session_comments c
            INNER JOIN users u ON u.id = c.user_id
            WHERE c.session_id = ?
            ORDER BY c.timestamp, c.rowid
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.db)
        .await?;
        Ok(comments)
    }
}
