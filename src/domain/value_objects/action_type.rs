use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// アウトボックスに積まれるユーザー操作の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendMessage,
    CreatePost,
    UploadStory,
    LikePost,
    AddComment,
    FollowUser,
    EditMessage,
    DeleteMessage,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::SendMessage => "send_message",
            ActionType::CreatePost => "create_post",
            ActionType::UploadStory => "upload_story",
            ActionType::LikePost => "like_post",
            ActionType::AddComment => "add_comment",
            ActionType::FollowUser => "follow_user",
            ActionType::EditMessage => "edit_message",
            ActionType::DeleteMessage => "delete_message",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "send_message" => Ok(ActionType::SendMessage),
            "create_post" => Ok(ActionType::CreatePost),
            "upload_story" => Ok(ActionType::UploadStory),
            "like_post" => Ok(ActionType::LikePost),
            "add_comment" => Ok(ActionType::AddComment),
            "follow_user" => Ok(ActionType::FollowUser),
            "edit_message" => Ok(ActionType::EditMessage),
            "delete_message" => Ok(ActionType::DeleteMessage),
            other => Err(format!("Unknown action type: {other}")),
        }
    }
}
