use crate::domain::value_objects::{ClientToken, ConversationId, MessageId, SendMessagePayload};
use crate::shared::time::truncate_to_millis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    PostShare,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::PostShare => "post_share",
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "post_share" => Ok(MessageKind::PostShare),
            other => Err(format!("Unknown message kind: {other}")),
        }
    }
}

/// オフラインでも表示できるチャットメッセージ。
///
/// `deleted` は墓標で、本文は物理削除しない（UI が「削除されました」を描画できるように）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub image_ref: Option<String>,
    pub post_ref: Option<String>,
    pub kind: MessageKind,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub client_token: Option<ClientToken>,
}

impl CachedMessage {
    pub fn new(
        message_id: MessageId,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        body: impl Into<String>,
        kind: MessageKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        let sender_id = sender_id.into();
        let receiver_id = receiver_id.into();
        Self {
            message_id,
            conversation_id: ConversationId::for_pair(&sender_id, &receiver_id),
            sender_id,
            receiver_id,
            body: body.into(),
            image_ref: None,
            post_ref: None,
            kind,
            edited: false,
            edited_at: None,
            deleted: false,
            created_at: truncate_to_millis(created_at),
            client_token: None,
        }
    }

    /// 送信待ちメッセージの楽観的エコー行を作る
    pub fn provisional_echo(payload: &SendMessagePayload) -> Self {
        let mut message = Self::new(
            payload.provisional_id.clone(),
            payload.sender_id.clone(),
            payload.receiver_id.clone(),
            payload.body.clone(),
            payload.kind,
            payload.created_at,
        );
        message.image_ref = payload.image_ref.clone();
        message.post_ref = payload.post_ref.clone();
        message.client_token = Some(payload.client_token.clone());
        message
    }

    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    pub fn with_post_ref(mut self, post_ref: impl Into<String>) -> Self {
        self.post_ref = Some(post_ref.into());
        self
    }

    pub fn with_client_token(mut self, token: ClientToken) -> Self {
        self.client_token = Some(token);
        self
    }

    pub fn is_provisional(&self) -> bool {
        self.message_id.is_provisional()
    }

    /// 作成から `window` 以内であれば編集・削除できる
    pub fn is_within_edit_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let elapsed = now.signed_duration_since(self.created_at);
        match elapsed.to_std() {
            Ok(elapsed) => elapsed <= window,
            // 作成時刻が未来（端末時計のずれ）なら窓の内側とみなす
            Err(_) => true,
        }
    }

    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }
}

/// `update_message` に渡す部分更新
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub body: Option<String>,
    pub edited: Option<bool>,
    pub deleted: Option<bool>,
}

impl MessagePatch {
    pub fn edit(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            edited: Some(true),
            deleted: None,
        }
    }

    pub fn tombstone() -> Self {
        Self {
            body: None,
            edited: None,
            deleted: Some(true),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.edited.is_none() && self.deleted.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::time::from_millis;

    fn message_at(millis: i64) -> CachedMessage {
        CachedMessage::new(
            MessageId::new("m1".into()).unwrap(),
            "me",
            "u2",
            "hello",
            MessageKind::Text,
            from_millis(millis),
        )
    }

    #[test]
    fn edit_window_is_inclusive_at_five_minutes() {
        let message = message_at(1_000_000);
        let window = Duration::from_secs(300);
        assert!(message.is_within_edit_window(from_millis(1_000_000 + 300_000), window));
        assert!(!message.is_within_edit_window(from_millis(1_000_000 + 300_001), window));
    }

    #[test]
    fn clock_skew_keeps_message_editable() {
        let message = message_at(2_000_000);
        assert!(message.is_within_edit_window(from_millis(1_000_000), Duration::from_secs(300)));
    }

    #[test]
    fn conversation_is_derived_from_participants() {
        let message = message_at(0);
        assert_eq!(message.conversation_id, ConversationId::for_pair("u2", "me"));
    }

    #[test]
    fn patch_builders() {
        assert!(MessagePatch::default().is_empty());
        let edit = MessagePatch::edit("fixed");
        assert_eq!(edit.edited, Some(true));
        assert_eq!(MessagePatch::tombstone().deleted, Some(true));
    }
}
