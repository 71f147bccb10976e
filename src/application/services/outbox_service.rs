use super::sync_service::OutboxEvent;
use crate::application::ports::local_store::LocalStore;
use crate::domain::entities::{CachedMessage, MessageKind, MessagePatch};
use crate::domain::value_objects::{
    ActionId, ActionPayload, AddCommentPayload, ClientToken, CreatePostPayload,
    DeleteMessagePayload, EditMessagePayload, FollowUserPayload, LikePostPayload, MessageId,
    SendMessagePayload, UploadStoryPayload,
};
use crate::shared::error::AppError;
use crate::shared::time::now_millis;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// `queue_send_message` の入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub kind: MessageKind,
    pub image_ref: Option<String>,
    pub post_ref: Option<String>,
}

impl OutgoingMessage {
    pub fn text(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            body: body.into(),
            kind: MessageKind::Text,
            image_ref: None,
            post_ref: None,
        }
    }

    pub fn image(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        image_ref: impl Into<String>,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageKind::Image,
            image_ref: Some(image_ref.into()),
            ..Self::text(sender_id, receiver_id, caption)
        }
    }

    pub fn post_share(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        post_ref: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageKind::PostShare,
            post_ref: Some(post_ref.into()),
            ..Self::text(sender_id, receiver_id, "")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub action_id: ActionId,
    pub echo: CachedMessage,
}

/// ユーザー操作を永続化してから楽観的に反映する。配信の成否は呼び出し側に返さない。
pub struct OutboxService {
    store: Arc<dyn LocalStore>,
    events: broadcast::Sender<OutboxEvent>,
    edit_window: Duration,
}

impl OutboxService {
    pub fn new(
        store: Arc<dyn LocalStore>,
        events: broadcast::Sender<OutboxEvent>,
        edit_window: Duration,
    ) -> Self {
        Self {
            store,
            events,
            edit_window,
        }
    }

    pub async fn queue_send_message(
        &self,
        message: OutgoingMessage,
    ) -> Result<QueuedMessage, AppError> {
        let payload = SendMessagePayload {
            client_token: ClientToken::generate(),
            provisional_id: MessageId::provisional(),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            body: message.body,
            kind: message.kind,
            image_ref: message.image_ref,
            post_ref: message.post_ref,
            created_at: now_millis(),
        };
        let echo = CachedMessage::provisional_echo(&payload);
        let payload = ActionPayload::SendMessage(payload);
        payload.validate().map_err(AppError::ValidationError)?;

        let action_id = self.store.enqueue_action_with_echo(&payload, &echo).await?;
        self.announce(action_id, &payload);
        Ok(QueuedMessage { action_id, echo })
    }

    pub async fn queue_create_post(
        &self,
        caption: impl Into<String>,
        media_ref: Option<String>,
    ) -> Result<ActionId, AppError> {
        self.enqueue(ActionPayload::CreatePost(CreatePostPayload {
            client_token: ClientToken::generate(),
            caption: caption.into(),
            media_ref,
        }))
        .await
    }

    pub async fn queue_upload_story(
        &self,
        media_ref: impl Into<String>,
        caption: Option<String>,
    ) -> Result<ActionId, AppError> {
        self.enqueue(ActionPayload::UploadStory(UploadStoryPayload {
            client_token: ClientToken::generate(),
            media_ref: media_ref.into(),
            caption,
        }))
        .await
    }

    /// キャッシュ済みの投稿があれば、いいね状態もその場で反映する
    pub async fn queue_like_post(
        &self,
        post_id: impl Into<String>,
        liked: bool,
    ) -> Result<ActionId, AppError> {
        let post_id = post_id.into();
        let action_id = self
            .enqueue(ActionPayload::LikePost(LikePostPayload {
                post_id: post_id.clone(),
                liked,
            }))
            .await?;

        match self.store.set_post_liked(&post_id, liked).await {
            Ok(()) => {}
            Err(AppError::NotFound(_)) => {
                tracing::debug!(target: "offline::outbox", post_id = %post_id, "liked post not cached");
            }
            Err(err) => {
                // 操作自体は保存済み。表示は次回の取得で追いつく
                tracing::warn!(
                    target: "offline::outbox",
                    post_id = %post_id,
                    error = %err,
                    "failed to apply optimistic like"
                );
            }
        }
        Ok(action_id)
    }

    pub async fn queue_add_comment(
        &self,
        post_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<ActionId, AppError> {
        self.enqueue(ActionPayload::AddComment(AddCommentPayload {
            client_token: ClientToken::generate(),
            post_id: post_id.into(),
            body: body.into(),
        }))
        .await
    }

    pub async fn queue_follow_user(
        &self,
        target_user_id: impl Into<String>,
        follow: bool,
    ) -> Result<ActionId, AppError> {
        self.enqueue(ActionPayload::FollowUser(FollowUserPayload {
            target_user_id: target_user_id.into(),
            follow,
        }))
        .await
    }

    /// 編集可能時間内であれば本文を差し替える。
    /// ローカルの変更と反映アクションは同じトランザクションで書く。
    pub async fn queue_edit_message(
        &self,
        message_id: &MessageId,
        body: impl Into<String>,
    ) -> Result<CachedMessage, AppError> {
        let body = body.into();
        self.ensure_mutable(message_id).await?;

        let payload = ActionPayload::EditMessage(EditMessagePayload {
            message_id: message_id.clone(),
            body: body.clone(),
        });
        self.enqueue_with_patch(payload, message_id, MessagePatch::edit(body))
            .await
    }

    /// 編集可能時間内であれば墓標を立てる。書き込みは編集と同じく一括
    pub async fn queue_delete_message(
        &self,
        message_id: &MessageId,
    ) -> Result<CachedMessage, AppError> {
        self.ensure_mutable(message_id).await?;

        let payload = ActionPayload::DeleteMessage(DeleteMessagePayload {
            message_id: message_id.clone(),
        });
        self.enqueue_with_patch(payload, message_id, MessagePatch::tombstone())
            .await
    }

    async fn ensure_mutable(&self, message_id: &MessageId) -> Result<CachedMessage, AppError> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("message {message_id}")))?;

        if message.is_provisional() {
            return Err(AppError::ValidationError(
                "Message has not been confirmed by the server yet".to_string(),
            ));
        }
        if message.deleted {
            return Err(AppError::ValidationError(
                "Message has already been deleted".to_string(),
            ));
        }
        if !message.is_within_edit_window(now_millis(), self.edit_window) {
            return Err(AppError::EditWindowExpired(format!(
                "message {message_id} is older than {} seconds",
                self.edit_window.as_secs()
            )));
        }
        Ok(message)
    }

    async fn enqueue(&self, payload: ActionPayload) -> Result<ActionId, AppError> {
        payload.validate().map_err(AppError::ValidationError)?;
        let action_id = self.store.enqueue_action(&payload).await?;
        self.announce(action_id, &payload);
        Ok(action_id)
    }

    async fn enqueue_with_patch(
        &self,
        payload: ActionPayload,
        message_id: &MessageId,
        patch: MessagePatch,
    ) -> Result<CachedMessage, AppError> {
        payload.validate().map_err(AppError::ValidationError)?;
        let (action_id, message) = self
            .store
            .enqueue_action_with_patch(&payload, message_id, patch)
            .await?;
        self.announce(action_id, &payload);
        Ok(message)
    }

    fn announce(&self, action_id: ActionId, payload: &ActionPayload) {
        tracing::info!(
            target: "offline::outbox",
            action_id = action_id.value(),
            action_type = %payload.action_type(),
            "action queued"
        );
        let _ = self.events.send(OutboxEvent::Enqueued {
            action_id,
            action_type: payload.action_type(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::ActionType;
    use crate::infrastructure::database::ConnectionPool;
    use crate::infrastructure::store::SqliteLocalStore;
    use crate::shared::time::from_millis;

    async fn setup() -> (Arc<dyn LocalStore>, OutboxService, broadcast::Receiver<OutboxEvent>) {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool));
        let (events, rx) = broadcast::channel(16);
        let service = OutboxService::new(Arc::clone(&store), events, Duration::from_secs(300));
        (store, service, rx)
    }

    fn confirmed(id: &str, created_at_millis: i64) -> CachedMessage {
        CachedMessage::new(
            MessageId::new(id.into()).unwrap(),
            "me",
            "u2",
            "original",
            MessageKind::Text,
            from_millis(created_at_millis),
        )
    }

    #[tokio::test]
    async fn send_message_persists_action_and_echo() {
        let (store, service, mut rx) = setup().await;

        let queued = service
            .queue_send_message(OutgoingMessage::text("me", "u2", "hello"))
            .await
            .unwrap();

        assert!(queued.echo.is_provisional());
        assert!(queued.echo.client_token.is_some());
        let messages = store.get_messages("u2", "me").await.unwrap();
        assert_eq!(messages, vec![queued.echo.clone()]);

        let pending = store.list_pending_actions().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action_type(), ActionType::SendMessage);
        assert_eq!(
            pending[0].payload.client_token(),
            queued.echo.client_token.as_ref()
        );

        assert_eq!(
            rx.recv().await.unwrap(),
            OutboxEvent::Enqueued {
                action_id: queued.action_id,
                action_type: ActionType::SendMessage,
            }
        );
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_storage() {
        let (store, service, _rx) = setup().await;
        let err = service
            .queue_send_message(OutgoingMessage::text("me", "u2", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(store.list_pending_actions().await.unwrap().is_empty());
        assert!(store.get_messages("me", "u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_outside_window_leaves_message_untouched() {
        let (store, service, _rx) = setup().await;
        let six_minutes_ago = (now_millis() - chrono::Duration::minutes(6)).timestamp_millis();
        let stale = confirmed("srv-1", six_minutes_ago);
        store.upsert_message(&stale).await.unwrap();

        let err = service
            .queue_edit_message(&stale.message_id, "changed")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EditWindowExpired(_)));

        let err = service
            .queue_delete_message(&stale.message_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EditWindowExpired(_)));

        let stored = store.get_message(&stale.message_id).await.unwrap().unwrap();
        assert_eq!(stored, stale);
        assert!(store.list_pending_actions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_inside_window_updates_and_queues() {
        let (store, service, _rx) = setup().await;
        let fresh = confirmed("srv-1", now_millis().timestamp_millis());
        store.upsert_message(&fresh).await.unwrap();

        let edited = service
            .queue_edit_message(&fresh.message_id, "changed")
            .await
            .unwrap();
        assert_eq!(edited.body, "changed");
        assert!(edited.edited);

        let deleted = service.queue_delete_message(&fresh.message_id).await.unwrap();
        assert!(deleted.deleted);

        let types: Vec<_> = store
            .list_pending_actions()
            .await
            .unwrap()
            .iter()
            .map(|a| a.action_type())
            .collect();
        assert_eq!(types, vec![ActionType::EditMessage, ActionType::DeleteMessage]);
    }

    #[tokio::test]
    async fn failed_local_edit_queues_nothing() {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool.clone()));
        let (events, mut rx) = broadcast::channel(16);
        let service = OutboxService::new(Arc::clone(&store), events, Duration::from_secs(300));

        let fresh = confirmed("srv-1", now_millis().timestamp_millis());
        store.upsert_message(&fresh).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER messages_read_only BEFORE UPDATE ON messages \
             BEGIN SELECT RAISE(ABORT, 'messages are read only'); END",
        )
        .execute(pool.get_pool())
        .await
        .unwrap();

        let err = service
            .queue_edit_message(&fresh.message_id, "changed")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        let err = service.queue_delete_message(&fresh.message_id).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        assert!(store.list_pending_actions().await.unwrap().is_empty());
        let stored = store.get_message(&fresh.message_id).await.unwrap().unwrap();
        assert_eq!(stored.body, "original");
        assert!(!stored.deleted);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn provisional_messages_cannot_be_edited() {
        let (_store, service, _rx) = setup().await;
        let queued = service
            .queue_send_message(OutgoingMessage::text("me", "u2", "hello"))
            .await
            .unwrap();

        let err = service
            .queue_edit_message(&queued.echo.message_id, "changed")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn like_without_cached_post_still_queues() {
        let (store, service, _rx) = setup().await;
        let action_id = service.queue_like_post("p-unknown", true).await.unwrap();
        let action = store.get_action(action_id).await.unwrap().unwrap();
        assert_eq!(action.action_type(), ActionType::LikePost);
    }
}
