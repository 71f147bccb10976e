use super::mappers::{
    action_from_row, count_from_i64, echo_from_row, message_from_row, post_from_row,
    story_from_row,
};
use super::rows::{
    MessageRow, OutboxCountRow, PendingActionRow, PostRow, ProvisionalEchoRow, StoryRow,
};
use crate::application::ports::local_store::LocalStore;
use crate::domain::entities::{
    CachedMessage, CachedPost, CachedStory, MessagePatch, MessageReconciliation, OutboxSummary,
    PendingAction, ProvisionalEcho,
};
use crate::domain::value_objects::{
    ActionId, ActionPayload, ActionStatus, ActionType, ConversationId, MessageId,
    PROVISIONAL_PREFIX,
};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use crate::shared::time::{from_millis, now_millis, to_chrono};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::time::Duration;

const MESSAGE_COLUMNS: &str = "message_id, conversation_id, sender_id, receiver_id, body, \
     image_ref, post_ref, kind, edited, edited_at, deleted, created_at, client_token";

const ACTION_COLUMNS: &str = "action_id, action_type, payload, status, retry_count, \
     enqueued_at, updated_at, next_attempt_at, completed_at, server_id, last_error";

/// `LocalStore` の SQLite 実装。プールは呼び出し側から渡される。
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: ConnectionPool,
}

impl SqliteLocalStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &SqlitePool {
        self.pool.get_pool()
    }

    fn provisional_pattern() -> String {
        format!("{PROVISIONAL_PREFIX}%")
    }

    /// 復元できない pending 行を failed に移し、残りのキューを止めない
    async fn quarantine_actions(&self, broken: &[(i64, AppError)]) -> Result<(), AppError> {
        let now = now_millis().timestamp_millis();
        let mut tx = self.pool().begin().await?;
        for (action_id, err) in broken {
            tracing::error!(
                target: "offline::store",
                action_id = *action_id,
                error = %err,
                "undecodable outbox row moved to failed"
            );
            sqlx::query(
                r#"
                UPDATE pending_actions
                SET status = 'failed', last_error = ?1, updated_at = ?2, next_attempt_at = NULL
                WHERE action_id = ?3 AND status = 'pending'
                "#,
            )
            .bind(undecodable(*action_id, err).to_string())
            .bind(now)
            .bind(*action_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn write_message(
    conn: &mut SqliteConnection,
    message: &CachedMessage,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO messages (
            message_id, conversation_id, sender_id, receiver_id, body,
            image_ref, post_ref, kind, edited, edited_at, deleted, created_at, client_token
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(message_id) DO UPDATE SET
            conversation_id = excluded.conversation_id,
            sender_id = excluded.sender_id,
            receiver_id = excluded.receiver_id,
            body = excluded.body,
            image_ref = excluded.image_ref,
            post_ref = excluded.post_ref,
            kind = excluded.kind,
            edited = excluded.edited,
            edited_at = excluded.edited_at,
            deleted = excluded.deleted,
            created_at = excluded.created_at,
            client_token = excluded.client_token
        "#,
    )
    .bind(message.message_id.as_str())
    .bind(message.conversation_id.as_str())
    .bind(&message.sender_id)
    .bind(&message.receiver_id)
    .bind(&message.body)
    .bind(&message.image_ref)
    .bind(&message.post_ref)
    .bind(message.kind.as_str())
    .bind(message.edited)
    .bind(message.edited_at.map(|ts| ts.timestamp_millis()))
    .bind(message.deleted)
    .bind(message.created_at_millis())
    .bind(message.client_token.as_ref().map(|token| token.as_str()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_post(conn: &mut SqliteConnection, post: &CachedPost) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO posts (
            post_id, author_id, author_name, media_ref, caption,
            like_count, comment_count, liked_by_me, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(post_id) DO UPDATE SET
            author_id = excluded.author_id,
            author_name = excluded.author_name,
            media_ref = excluded.media_ref,
            caption = excluded.caption,
            like_count = excluded.like_count,
            comment_count = excluded.comment_count,
            liked_by_me = excluded.liked_by_me,
            created_at = excluded.created_at
        "#,
    )
    .bind(&post.post_id)
    .bind(&post.author_id)
    .bind(&post.author_name)
    .bind(&post.media_ref)
    .bind(&post.caption)
    .bind(i64::from(post.like_count))
    .bind(i64::from(post.comment_count))
    .bind(post.liked_by_me)
    .bind(post.created_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_story(conn: &mut SqliteConnection, story: &CachedStory) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO stories (
            story_id, author_id, author_name, media_ref, caption, created_at, expires_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(story_id) DO UPDATE SET
            author_id = excluded.author_id,
            author_name = excluded.author_name,
            media_ref = excluded.media_ref,
            caption = excluded.caption,
            created_at = excluded.created_at,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(&story.story_id)
    .bind(&story.author_id)
    .bind(&story.author_name)
    .bind(&story.media_ref)
    .bind(&story.caption)
    .bind(story.created_at.timestamp_millis())
    .bind(story.expires_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_action(
    conn: &mut SqliteConnection,
    payload: &ActionPayload,
) -> Result<ActionId, AppError> {
    let json = payload.to_json()?;
    let now = now_millis().timestamp_millis();

    let result = sqlx::query(
        r#"
        INSERT INTO pending_actions (
            action_type, payload, client_token, status, retry_count, enqueued_at, updated_at
        ) VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?4)
        "#,
    )
    .bind(payload.action_type().as_str())
    .bind(&json)
    .bind(payload.client_token().map(|token| token.as_str()))
    .bind(now)
    .execute(&mut *conn)
    .await?;

    ActionId::new(result.last_insert_rowid()).map_err(AppError::Internal)
}

async fn patch_message(
    conn: &mut SqliteConnection,
    message_id: &MessageId,
    patch: MessagePatch,
) -> Result<CachedMessage, AppError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"
    ))
    .bind(message_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Err(AppError::NotFound(format!("message {message_id}")));
    };
    let mut message = message_from_row(row)?;

    if patch.is_empty() {
        return Ok(message);
    }

    if let Some(body) = patch.body {
        message.body = body;
    }
    if let Some(edited) = patch.edited {
        message.edited = edited;
        if edited {
            message.edited_at = Some(now_millis());
        }
    }
    if let Some(deleted) = patch.deleted {
        message.deleted = deleted;
    }

    sqlx::query(
        r#"
        UPDATE messages
        SET body = ?1, edited = ?2, edited_at = ?3, deleted = ?4
        WHERE message_id = ?5
        "#,
    )
    .bind(&message.body)
    .bind(message.edited)
    .bind(message.edited_at.map(|ts| ts.timestamp_millis()))
    .bind(message.deleted)
    .bind(message_id.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(message)
}

/// 復元できた行と、復元できなかった行の ID とエラーに分ける
fn split_actions(rows: Vec<PendingActionRow>) -> (Vec<PendingAction>, Vec<(i64, AppError)>) {
    let mut decoded = Vec::with_capacity(rows.len());
    let mut broken = Vec::new();
    for row in rows {
        let action_id = row.action_id;
        match action_from_row(row) {
            Ok(action) => decoded.push(action),
            Err(err) => broken.push((action_id, err)),
        }
    }
    (decoded, broken)
}

fn undecodable(action_id: i64, err: &AppError) -> AppError {
    AppError::DeserializationError(format!("outbox action {action_id}: {err}"))
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn upsert_message(&self, message: &CachedMessage) -> Result<(), AppError> {
        let mut conn = self.pool().acquire().await?;
        write_message(&mut conn, message).await?;
        Ok(())
    }

    async fn upsert_messages(&self, messages: &[CachedMessage]) -> Result<(), AppError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for message in messages {
            write_message(&mut tx, message).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_message(&self, message_id: &MessageId) -> Result<Option<CachedMessage>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"
        ))
        .bind(message_id.as_str())
        .fetch_optional(self.pool())
        .await?;

        row.map(message_from_row).transpose()
    }

    async fn get_messages(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<CachedMessage>, AppError> {
        let conversation = ConversationId::for_pair(user_a, user_b);
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 \
             ORDER BY created_at ASC, message_id ASC"
        ))
        .bind(conversation.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    async fn update_message(
        &self,
        message_id: &MessageId,
        patch: MessagePatch,
    ) -> Result<CachedMessage, AppError> {
        let mut tx = self.pool().begin().await?;
        let message = patch_message(&mut tx, message_id, patch).await?;
        tx.commit().await?;
        Ok(message)
    }

    async fn clear_conversation(&self, user_a: &str, user_b: &str) -> Result<u64, AppError> {
        let conversation = ConversationId::for_pair(user_a, user_b);
        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = ?1")
            .bind(conversation.as_str())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_messages_older_than(&self, age: Duration) -> Result<u64, AppError> {
        let cutoff = (now_millis() - to_chrono(age)).timestamp_millis();
        // 送信待ちのエコーは残す
        let result = sqlx::query(
            r#"
            DELETE FROM messages
            WHERE created_at < ?1 AND message_id NOT LIKE ?2
            "#,
        )
        .bind(cutoff)
        .bind(Self::provisional_pattern())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn provisional_echoes(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<ProvisionalEcho>, AppError> {
        let conversation = ConversationId::for_pair(user_a, user_b);
        let rows = sqlx::query_as::<_, ProvisionalEchoRow>(
            r#"
            SELECT
                m.message_id, m.conversation_id, m.sender_id, m.receiver_id, m.body,
                m.image_ref, m.post_ref, m.kind, m.edited, m.edited_at, m.deleted,
                m.created_at, m.client_token,
                (
                    SELECT pa.server_id FROM pending_actions pa
                    WHERE pa.client_token = m.client_token
                      AND pa.action_type = ?3
                      AND pa.status = 'completed'
                      AND pa.server_id IS NOT NULL
                    ORDER BY pa.action_id DESC
                    LIMIT 1
                ) AS delivered_server_id
            FROM messages m
            WHERE m.conversation_id = ?1 AND m.message_id LIKE ?2
            ORDER BY m.created_at ASC, m.message_id ASC
            "#,
        )
        .bind(conversation.as_str())
        .bind(Self::provisional_pattern())
        .bind(ActionType::SendMessage.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(echo_from_row).collect()
    }

    async fn apply_message_reconciliation(
        &self,
        plan: &MessageReconciliation,
    ) -> Result<(), AppError> {
        if plan.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for message_id in &plan.superseded {
            sqlx::query("DELETE FROM messages WHERE message_id = ?1")
                .bind(message_id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        for message in &plan.upserts {
            write_message(&mut tx, message).await?;
        }
        tx.commit().await?;

        tracing::debug!(
            target: "offline::store",
            upserts = plan.upserts.len(),
            superseded = plan.superseded.len(),
            "applied message reconciliation"
        );
        Ok(())
    }

    async fn upsert_post(&self, post: &CachedPost) -> Result<(), AppError> {
        let mut conn = self.pool().acquire().await?;
        write_post(&mut conn, post).await?;
        Ok(())
    }

    async fn upsert_posts(&self, posts: &[CachedPost]) -> Result<(), AppError> {
        if posts.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for post in posts {
            write_post(&mut tx, post).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<CachedPost>, AppError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT post_id, author_id, author_name, media_ref, caption,
                   like_count, comment_count, liked_by_me, created_at
            FROM posts WHERE post_id = ?1
            "#,
        )
        .bind(post_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(post_from_row))
    }

    async fn get_posts(&self, limit: u32) -> Result<Vec<CachedPost>, AppError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT post_id, author_id, author_name, media_ref, caption,
                   like_count, comment_count, liked_by_me, created_at
            FROM posts
            ORDER BY created_at DESC, post_id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(post_from_row).collect())
    }

    async fn set_post_liked(&self, post_id: &str, liked: bool) -> Result<(), AppError> {
        // SET 句の右辺は更新前の値で評価される
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET like_count = CASE
                    WHEN liked_by_me = ?2 THEN like_count
                    WHEN ?2 = 1 THEN like_count + 1
                    ELSE MAX(like_count - 1, 0)
                END,
                liked_by_me = ?2
            WHERE post_id = ?1
            "#,
        )
        .bind(post_id)
        .bind(liked)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("post {post_id}")));
        }
        Ok(())
    }

    async fn upsert_story(&self, story: &CachedStory) -> Result<(), AppError> {
        let mut conn = self.pool().acquire().await?;
        write_story(&mut conn, story).await?;
        Ok(())
    }

    async fn get_active_stories(&self) -> Result<Vec<CachedStory>, AppError> {
        let now = now_millis().timestamp_millis();
        let rows = sqlx::query_as::<_, StoryRow>(
            r#"
            SELECT story_id, author_id, author_name, media_ref, caption, created_at, expires_at
            FROM stories
            WHERE expires_at > ?1
            ORDER BY created_at ASC, story_id ASC
            "#,
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(story_from_row).collect())
    }

    async fn replace_stories_for_author(
        &self,
        author_id: &str,
        stories: &[CachedStory],
    ) -> Result<(), AppError> {
        let mut tx = self.pool().begin().await?;
        let removed = sqlx::query("DELETE FROM stories WHERE author_id = ?1")
            .bind(author_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        for story in stories {
            write_story(&mut tx, story).await?;
        }
        tx.commit().await?;

        tracing::debug!(
            target: "offline::store",
            author_id,
            removed,
            stored = stories.len(),
            "replaced author stories"
        );
        Ok(())
    }

    async fn purge_expired_stories(&self) -> Result<u64, AppError> {
        let now = now_millis().timestamp_millis();
        let result = sqlx::query("DELETE FROM stories WHERE expires_at <= ?1")
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn enqueue_action(&self, payload: &ActionPayload) -> Result<ActionId, AppError> {
        let mut conn = self.pool().acquire().await?;
        let action_id = insert_action(&mut conn, payload).await?;
        tracing::debug!(
            target: "offline::store",
            action_id = action_id.value(),
            action_type = %payload.action_type(),
            "enqueued action"
        );
        Ok(action_id)
    }

    async fn enqueue_action_with_echo(
        &self,
        payload: &ActionPayload,
        echo: &CachedMessage,
    ) -> Result<ActionId, AppError> {
        let mut tx = self.pool().begin().await?;
        let action_id = insert_action(&mut tx, payload).await?;
        write_message(&mut tx, echo).await?;
        tx.commit().await?;

        tracing::debug!(
            target: "offline::store",
            action_id = action_id.value(),
            action_type = %payload.action_type(),
            echo_id = %echo.message_id,
            "enqueued action with optimistic echo"
        );
        Ok(action_id)
    }

    async fn enqueue_action_with_patch(
        &self,
        payload: &ActionPayload,
        message_id: &MessageId,
        patch: MessagePatch,
    ) -> Result<(ActionId, CachedMessage), AppError> {
        let mut tx = self.pool().begin().await?;
        let message = patch_message(&mut tx, message_id, patch).await?;
        let action_id = insert_action(&mut tx, payload).await?;
        tx.commit().await?;

        tracing::debug!(
            target: "offline::store",
            action_id = action_id.value(),
            action_type = %payload.action_type(),
            message_id = %message_id,
            "enqueued action with local patch"
        );
        Ok((action_id, message))
    }

    async fn get_action(&self, action_id: ActionId) -> Result<Option<PendingAction>, AppError> {
        let row = sqlx::query_as::<_, PendingActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM pending_actions WHERE action_id = ?1"
        ))
        .bind(action_id.value())
        .fetch_optional(self.pool())
        .await?;

        row.map(action_from_row).transpose()
    }

    async fn list_pending_actions(&self) -> Result<Vec<PendingAction>, AppError> {
        let rows = sqlx::query_as::<_, PendingActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM pending_actions WHERE status = ?1 \
             ORDER BY enqueued_at ASC, action_id ASC"
        ))
        .bind(ActionStatus::Pending.as_str())
        .fetch_all(self.pool())
        .await?;

        let (actions, broken) = split_actions(rows);
        if !broken.is_empty() {
            self.quarantine_actions(&broken).await?;
        }
        Ok(actions)
    }

    async fn list_failed_actions(&self) -> Result<Vec<PendingAction>, AppError> {
        let rows = sqlx::query_as::<_, PendingActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM pending_actions WHERE status = ?1 \
             ORDER BY enqueued_at ASC, action_id ASC"
        ))
        .bind(ActionStatus::Failed.as_str())
        .fetch_all(self.pool())
        .await?;

        // 壊れた行は黙って省かない。ID を含めて返し、破棄できるようにする
        let (actions, broken) = split_actions(rows);
        if let Some((action_id, err)) = broken.first() {
            return Err(undecodable(*action_id, err));
        }
        Ok(actions)
    }

    async fn mark_completed(
        &self,
        action_id: ActionId,
        server_id: Option<String>,
    ) -> Result<(), AppError> {
        let now = now_millis().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE pending_actions
            SET status = 'completed',
                server_id = ?1,
                completed_at = ?2,
                updated_at = ?2,
                next_attempt_at = NULL,
                last_error = NULL
            WHERE action_id = ?3
            "#,
        )
        .bind(&server_id)
        .bind(now)
        .bind(action_id.value())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("action {action_id}")));
        }
        Ok(())
    }

    async fn increment_retry(
        &self,
        action_id: ActionId,
        next_attempt_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> Result<u32, AppError> {
        let now = now_millis().timestamp_millis();
        let retry_count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE pending_actions
            SET retry_count = retry_count + 1,
                next_attempt_at = ?1,
                last_error = ?2,
                updated_at = ?3
            WHERE action_id = ?4 AND status = 'pending'
            RETURNING retry_count
            "#,
        )
        .bind(next_attempt_at.map(|ts| ts.timestamp_millis()))
        .bind(error)
        .bind(now)
        .bind(action_id.value())
        .fetch_optional(self.pool())
        .await?;

        retry_count
            .map(count_from_i64)
            .ok_or_else(|| AppError::NotFound(format!("pending action {action_id}")))
    }

    async fn mark_failed(&self, action_id: ActionId, error: &str) -> Result<(), AppError> {
        let now = now_millis().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE pending_actions
            SET status = 'failed', last_error = ?1, updated_at = ?2, next_attempt_at = NULL
            WHERE action_id = ?3 AND status = 'pending'
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(action_id.value())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("pending action {action_id}")));
        }
        Ok(())
    }

    async fn reset_action(&self, action_id: ActionId) -> Result<(), AppError> {
        let now = now_millis().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE pending_actions
            SET status = 'pending', retry_count = 0, next_attempt_at = NULL,
                last_error = NULL, updated_at = ?1
            WHERE action_id = ?2 AND status = 'failed'
            "#,
        )
        .bind(now)
        .bind(action_id.value())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("failed action {action_id}")));
        }
        Ok(())
    }

    async fn discard_action(&self, action_id: ActionId) -> Result<(), AppError> {
        let mut tx = self.pool().begin().await?;

        let client_token: Option<Option<String>> = sqlx::query_scalar(
            "DELETE FROM pending_actions WHERE action_id = ?1 AND status != 'completed' \
             RETURNING client_token",
        )
        .bind(action_id.value())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(client_token) = client_token else {
            return Err(AppError::NotFound(format!("undelivered action {action_id}")));
        };

        // 配信されなかった操作の楽観的エコーも取り消す
        if let Some(token) = client_token {
            sqlx::query("DELETE FROM messages WHERE client_token = ?1 AND message_id LIKE ?2")
                .bind(&token)
                .bind(Self::provisional_pattern())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn purge_completed_older_than(&self, age: Duration) -> Result<u64, AppError> {
        let cutoff = (now_millis() - to_chrono(age)).timestamp_millis();
        let result = sqlx::query(
            "DELETE FROM pending_actions WHERE status = 'completed' AND completed_at < ?1",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn outbox_summary(&self) -> Result<OutboxSummary, AppError> {
        let counts = sqlx::query_as::<_, OutboxCountRow>(
            "SELECT status, COUNT(*) AS count FROM pending_actions GROUP BY status",
        )
        .fetch_all(self.pool())
        .await?;

        let oldest_pending: Option<i64> = sqlx::query_scalar(
            "SELECT MIN(enqueued_at) FROM pending_actions WHERE status = 'pending'",
        )
        .fetch_one(self.pool())
        .await?;

        let mut summary = OutboxSummary {
            oldest_pending_at: oldest_pending.map(from_millis),
            ..OutboxSummary::default()
        };
        for row in counts {
            let count = u64::try_from(row.count).unwrap_or(0);
            match row.status.parse::<ActionStatus>() {
                Ok(ActionStatus::Pending) => summary.pending = count,
                Ok(ActionStatus::Completed) => summary.completed = count,
                Ok(ActionStatus::Failed) => summary.failed = count,
                Err(err) => {
                    tracing::warn!(target: "offline::store", error = %err, "unknown outbox status")
                }
            }
        }
        Ok(summary)
    }
}
