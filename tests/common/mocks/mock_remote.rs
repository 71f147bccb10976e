use async_trait::async_trait;
use chrono::{DateTime, Utc};
use socialite_lib::domain::entities::{CachedMessage, CachedPost, CachedStory};
use socialite_lib::domain::value_objects::{
    ActionType, AddCommentPayload, ConversationId, CreatePostPayload, DeleteMessagePayload,
    EditMessagePayload, FollowUserPayload, LikePostPayload, SendMessagePayload,
    UploadStoryPayload,
};
use socialite_lib::{RemoteAck, RemoteApiClient, RemoteError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// 送出された操作 1 件分の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub action_type: ActionType,
    /// 本文や対象 ID など、操作を見分けるための値
    pub detail: String,
}

/// Remote API の代役。送出を記録し、予約された失敗を順に返す。
#[derive(Clone, Default)]
pub struct MockRemoteApi {
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    failures: Arc<RwLock<VecDeque<RemoteError>>>,
    next_server_id: Arc<AtomicU32>,
    messages: Arc<RwLock<Vec<CachedMessage>>>,
    feed: Arc<RwLock<Vec<CachedPost>>>,
    stories: Arc<RwLock<HashMap<String, Vec<CachedStory>>>>,
    fetch_delay: Arc<RwLock<Option<Duration>>>,
    fetch_count: Arc<AtomicU32>,
}

impl MockRemoteApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の送出を `error` で失敗させる。複数回呼ぶと順に消費される。
    pub async fn fail_next(&self, error: RemoteError) {
        self.failures.write().await.push_back(error);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_types(&self) -> Vec<ActionType> {
        self.calls
            .read()
            .await
            .iter()
            .map(|call| call.action_type)
            .collect()
    }

    pub async fn set_messages(&self, messages: Vec<CachedMessage>) {
        *self.messages.write().await = messages;
    }

    pub async fn set_feed(&self, posts: Vec<CachedPost>) {
        *self.feed.write().await = posts;
    }

    pub async fn set_stories(&self, author_id: &str, stories: Vec<CachedStory>) {
        self.stories
            .write()
            .await
            .insert(author_id.to_string(), stories);
    }

    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.write().await = Some(delay);
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    async fn respond(
        &self,
        action_type: ActionType,
        detail: impl Into<String>,
        assigns_id: bool,
    ) -> Result<RemoteAck, RemoteError> {
        self.calls.write().await.push(RecordedCall {
            action_type,
            detail: detail.into(),
        });
        if let Some(error) = self.failures.write().await.pop_front() {
            return Err(error);
        }
        if assigns_id {
            let id = self.next_server_id.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(RemoteAck::with_id(format!("srv-{id}")))
        } else {
            Ok(RemoteAck::empty())
        }
    }

    async fn wait_for_fetch(&self) {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteApiClient for MockRemoteApi {
    async fn send_message(&self, payload: &SendMessagePayload) -> Result<RemoteAck, RemoteError> {
        self.respond(ActionType::SendMessage, payload.body.clone(), true)
            .await
    }

    async fn create_post(&self, payload: &CreatePostPayload) -> Result<RemoteAck, RemoteError> {
        self.respond(ActionType::CreatePost, payload.caption.clone(), true)
            .await
    }

    async fn upload_story(&self, payload: &UploadStoryPayload) -> Result<RemoteAck, RemoteError> {
        self.respond(ActionType::UploadStory, payload.media_ref.clone(), true)
            .await
    }

    async fn like_post(&self, payload: &LikePostPayload) -> Result<RemoteAck, RemoteError> {
        self.respond(ActionType::LikePost, payload.post_id.clone(), false)
            .await
    }

    async fn add_comment(&self, payload: &AddCommentPayload) -> Result<RemoteAck, RemoteError> {
        self.respond(ActionType::AddComment, payload.body.clone(), true)
            .await
    }

    async fn follow_user(&self, payload: &FollowUserPayload) -> Result<RemoteAck, RemoteError> {
        self.respond(ActionType::FollowUser, payload.target_user_id.clone(), false)
            .await
    }

    async fn edit_message(&self, payload: &EditMessagePayload) -> Result<RemoteAck, RemoteError> {
        self.respond(ActionType::EditMessage, payload.message_id.to_string(), false)
            .await
    }

    async fn delete_message(
        &self,
        payload: &DeleteMessagePayload,
    ) -> Result<RemoteAck, RemoteError> {
        self.respond(
            ActionType::DeleteMessage,
            payload.message_id.to_string(),
            false,
        )
        .await
    }

    async fn fetch_messages(
        &self,
        user_a: &str,
        user_b: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CachedMessage>, RemoteError> {
        self.wait_for_fetch().await;
        let conversation = ConversationId::for_pair(user_a, user_b);
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|message| message.conversation_id == conversation)
            .filter(|message| since.map_or(true, |since| message.created_at > since))
            .cloned()
            .collect())
    }

    async fn fetch_feed(&self, limit: u32) -> Result<Vec<CachedPost>, RemoteError> {
        self.wait_for_fetch().await;
        Ok(self
            .feed
            .read()
            .await
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn fetch_active_stories(
        &self,
        author_id: &str,
    ) -> Result<Vec<CachedStory>, RemoteError> {
        self.wait_for_fetch().await;
        Ok(self
            .stories
            .read()
            .await
            .get(author_id)
            .cloned()
            .unwrap_or_default())
    }
}
