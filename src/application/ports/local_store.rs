use crate::domain::entities::{
    CachedMessage, CachedPost, CachedStory, MessagePatch, MessageReconciliation, OutboxSummary,
    PendingAction, ProvisionalEcho,
};
use crate::domain::value_objects::{ActionId, ActionPayload, MessageId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// 端末ローカルの永続キャッシュとアウトボックス。
///
/// 失敗はすべて `AppError::Database` として返り、対象行が無い場合の
/// `AppError::NotFound` とは区別される。複数行の書き込みは単一トランザクション。
#[async_trait]
pub trait LocalStore: Send + Sync {
    // messages
    async fn upsert_message(&self, message: &CachedMessage) -> Result<(), AppError>;
    async fn upsert_messages(&self, messages: &[CachedMessage]) -> Result<(), AppError>;
    async fn get_message(&self, message_id: &MessageId) -> Result<Option<CachedMessage>, AppError>;
    async fn get_messages(&self, user_a: &str, user_b: &str)
        -> Result<Vec<CachedMessage>, AppError>;
    async fn update_message(
        &self,
        message_id: &MessageId,
        patch: MessagePatch,
    ) -> Result<CachedMessage, AppError>;
    async fn clear_conversation(&self, user_a: &str, user_b: &str) -> Result<u64, AppError>;
    async fn purge_messages_older_than(&self, age: Duration) -> Result<u64, AppError>;
    async fn provisional_echoes(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<ProvisionalEcho>, AppError>;
    async fn apply_message_reconciliation(
        &self,
        plan: &MessageReconciliation,
    ) -> Result<(), AppError>;

    // posts
    async fn upsert_post(&self, post: &CachedPost) -> Result<(), AppError>;
    async fn upsert_posts(&self, posts: &[CachedPost]) -> Result<(), AppError>;
    async fn get_post(&self, post_id: &str) -> Result<Option<CachedPost>, AppError>;
    async fn get_posts(&self, limit: u32) -> Result<Vec<CachedPost>, AppError>;
    async fn set_post_liked(&self, post_id: &str, liked: bool) -> Result<(), AppError>;

    // stories
    async fn upsert_story(&self, story: &CachedStory) -> Result<(), AppError>;
    async fn get_active_stories(&self) -> Result<Vec<CachedStory>, AppError>;
    async fn replace_stories_for_author(
        &self,
        author_id: &str,
        stories: &[CachedStory],
    ) -> Result<(), AppError>;
    async fn purge_expired_stories(&self) -> Result<u64, AppError>;

    // outbox
    async fn enqueue_action(&self, payload: &ActionPayload) -> Result<ActionId, AppError>;
    async fn enqueue_action_with_echo(
        &self,
        payload: &ActionPayload,
        echo: &CachedMessage,
    ) -> Result<ActionId, AppError>;
    /// ローカルの変更とアクションを同じトランザクションで書き込む
    async fn enqueue_action_with_patch(
        &self,
        payload: &ActionPayload,
        message_id: &MessageId,
        patch: MessagePatch,
    ) -> Result<(ActionId, CachedMessage), AppError>;
    async fn get_action(&self, action_id: ActionId) -> Result<Option<PendingAction>, AppError>;
    async fn list_pending_actions(&self) -> Result<Vec<PendingAction>, AppError>;
    async fn list_failed_actions(&self) -> Result<Vec<PendingAction>, AppError>;
    async fn mark_completed(
        &self,
        action_id: ActionId,
        server_id: Option<String>,
    ) -> Result<(), AppError>;
    async fn increment_retry(
        &self,
        action_id: ActionId,
        next_attempt_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> Result<u32, AppError>;
    async fn mark_failed(&self, action_id: ActionId, error: &str) -> Result<(), AppError>;
    async fn reset_action(&self, action_id: ActionId) -> Result<(), AppError>;
    async fn discard_action(&self, action_id: ActionId) -> Result<(), AppError>;
    async fn purge_completed_older_than(&self, age: Duration) -> Result<u64, AppError>;
    async fn outbox_summary(&self) -> Result<OutboxSummary, AppError>;
}
