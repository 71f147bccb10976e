use super::{ActionType, ClientToken, MessageId};
use crate::domain::entities::MessageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub client_token: ClientToken,
    pub provisional_id: MessageId,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub kind: MessageKind,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub post_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostPayload {
    pub client_token: ClientToken,
    pub caption: String,
    #[serde(default)]
    pub media_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStoryPayload {
    pub client_token: ClientToken,
    pub media_ref: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikePostPayload {
    pub post_id: String,
    pub liked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCommentPayload {
    pub client_token: ClientToken,
    pub post_id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUserPayload {
    pub target_user_id: String,
    pub follow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditMessagePayload {
    pub message_id: MessageId,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessagePayload {
    pub message_id: MessageId,
}

/// アウトボックス行のペイロード。操作ごとに型付けされ、JSON になるのは保存時のみ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    SendMessage(SendMessagePayload),
    CreatePost(CreatePostPayload),
    UploadStory(UploadStoryPayload),
    LikePost(LikePostPayload),
    AddComment(AddCommentPayload),
    FollowUser(FollowUserPayload),
    EditMessage(EditMessagePayload),
    DeleteMessage(DeleteMessagePayload),
}

impl ActionPayload {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionPayload::SendMessage(_) => ActionType::SendMessage,
            ActionPayload::CreatePost(_) => ActionType::CreatePost,
            ActionPayload::UploadStory(_) => ActionType::UploadStory,
            ActionPayload::LikePost(_) => ActionType::LikePost,
            ActionPayload::AddComment(_) => ActionType::AddComment,
            ActionPayload::FollowUser(_) => ActionType::FollowUser,
            ActionPayload::EditMessage(_) => ActionType::EditMessage,
            ActionPayload::DeleteMessage(_) => ActionType::DeleteMessage,
        }
    }

    pub fn client_token(&self) -> Option<&ClientToken> {
        match self {
            ActionPayload::SendMessage(p) => Some(&p.client_token),
            ActionPayload::CreatePost(p) => Some(&p.client_token),
            ActionPayload::UploadStory(p) => Some(&p.client_token),
            ActionPayload::AddComment(p) => Some(&p.client_token),
            ActionPayload::LikePost(_)
            | ActionPayload::FollowUser(_)
            | ActionPayload::EditMessage(_)
            | ActionPayload::DeleteMessage(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ActionPayload::SendMessage(p) => {
                require("sender_id", &p.sender_id)?;
                require("receiver_id", &p.receiver_id)?;
                if p.body.trim().is_empty() && p.image_ref.is_none() && p.post_ref.is_none() {
                    return Err("Message must carry a body, an image or a post".to_string());
                }
                Ok(())
            }
            ActionPayload::CreatePost(p) => {
                if p.caption.trim().is_empty() && p.media_ref.is_none() {
                    return Err("Post must carry a caption or media".to_string());
                }
                Ok(())
            }
            ActionPayload::UploadStory(p) => require("media_ref", &p.media_ref),
            ActionPayload::LikePost(p) => require("post_id", &p.post_id),
            ActionPayload::AddComment(p) => {
                require("post_id", &p.post_id)?;
                require("body", &p.body)
            }
            ActionPayload::FollowUser(p) => require("target_user_id", &p.target_user_id),
            ActionPayload::EditMessage(p) => require("body", &p.body),
            ActionPayload::DeleteMessage(_) => Ok(()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 保存された JSON を復元し、列に記録された種類と一致するか確認する
    pub fn from_stored(action_type: ActionType, json: &str) -> Result<Self, String> {
        let payload: ActionPayload =
            serde_json::from_str(json).map_err(|e| format!("Invalid action payload: {e}"))?;
        if payload.action_type() != action_type {
            return Err(format!(
                "Payload type {} does not match column {}",
                payload.action_type(),
                action_type
            ));
        }
        Ok(payload)
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_payload(body: &str) -> ActionPayload {
        ActionPayload::SendMessage(SendMessagePayload {
            client_token: ClientToken::generate(),
            provisional_id: MessageId::provisional(),
            sender_id: "me".into(),
            receiver_id: "u2".into(),
            body: body.into(),
            kind: MessageKind::Text,
            image_ref: None,
            post_ref: None,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn stored_json_is_tagged_with_action_type() {
        let payload = send_payload("hi");
        let json = payload.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "send_message");
        assert_eq!(value["body"], "hi");

        let restored = ActionPayload::from_stored(ActionType::SendMessage, &json).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn mismatched_column_type_is_rejected() {
        let json = send_payload("hi").to_json().unwrap();
        assert!(ActionPayload::from_stored(ActionType::LikePost, &json).is_err());
    }

    #[test]
    fn empty_message_is_invalid() {
        assert!(send_payload("   ").validate().is_err());
        assert!(send_payload("hi").validate().is_ok());
    }

    #[test]
    fn only_creation_actions_carry_tokens() {
        assert!(send_payload("hi").client_token().is_some());
        let like = ActionPayload::LikePost(LikePostPayload {
            post_id: "p1".into(),
            liked: true,
        });
        assert!(like.client_token().is_none());
        assert_eq!(like.action_type(), ActionType::LikePost);
    }
}
