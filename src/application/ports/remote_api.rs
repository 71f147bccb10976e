use crate::domain::entities::{CachedMessage, CachedPost, CachedStory};
use crate::domain::value_objects::{
    AddCommentPayload, CreatePostPayload, DeleteMessagePayload, EditMessagePayload,
    FollowUserPayload, LikePostPayload, SendMessagePayload, UploadStoryPayload,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAck {
    /// サーバーが採番した ID（作成系の操作のみ）
    pub server_id: Option<String>,
}

impl RemoteAck {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_id(server_id: impl Into<String>) -> Self {
        Self {
            server_id: Some(server_id.into()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("device is offline")]
    Offline,

    #[error("request timed out")]
    Timeout,

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("request rejected {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// HTTP ステータスから分類する。408/429 は一時的な失敗として扱う。
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 429 => RemoteError::Server { status, message },
            400..=499 => RemoteError::Rejected { status, message },
            _ => RemoteError::Server { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, RemoteError::Rejected { .. })
    }

    /// この失敗で配信パスを打ち切るべきか
    pub fn indicates_offline(&self) -> bool {
        matches!(self, RemoteError::Offline)
    }
}

/// サーバー API。HTTP 実装はアプリ側が提供する。
#[async_trait]
pub trait RemoteApiClient: Send + Sync {
    async fn send_message(&self, payload: &SendMessagePayload) -> Result<RemoteAck, RemoteError>;
    async fn create_post(&self, payload: &CreatePostPayload) -> Result<RemoteAck, RemoteError>;
    async fn upload_story(&self, payload: &UploadStoryPayload) -> Result<RemoteAck, RemoteError>;
    async fn like_post(&self, payload: &LikePostPayload) -> Result<RemoteAck, RemoteError>;
    async fn add_comment(&self, payload: &AddCommentPayload) -> Result<RemoteAck, RemoteError>;
    async fn follow_user(&self, payload: &FollowUserPayload) -> Result<RemoteAck, RemoteError>;
    async fn edit_message(&self, payload: &EditMessagePayload) -> Result<RemoteAck, RemoteError>;
    async fn delete_message(
        &self,
        payload: &DeleteMessagePayload,
    ) -> Result<RemoteAck, RemoteError>;

    async fn fetch_messages(
        &self,
        user_a: &str,
        user_b: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CachedMessage>, RemoteError>;
    async fn fetch_feed(&self, limit: u32) -> Result<Vec<CachedPost>, RemoteError>;
    async fn fetch_active_stories(&self, author_id: &str)
        -> Result<Vec<CachedStory>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(!RemoteError::from_status(404, "gone").is_retryable());
        assert!(!RemoteError::from_status(422, "bad").is_retryable());
        assert!(RemoteError::from_status(429, "slow down").is_retryable());
        assert!(RemoteError::from_status(408, "timeout").is_retryable());
        assert!(RemoteError::from_status(503, "busy").is_retryable());
        assert!(RemoteError::Timeout.is_retryable());
    }

    #[test]
    fn only_offline_stops_the_pass() {
        assert!(RemoteError::Offline.indicates_offline());
        assert!(!RemoteError::Timeout.indicates_offline());
        assert!(!RemoteError::from_status(500, "boom").indicates_offline());
    }
}
