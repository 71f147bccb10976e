pub mod action_id;
pub mod action_payload;
pub mod action_status;
pub mod action_type;
pub mod client_token;
pub mod conversation_id;
pub mod message_id;

pub use action_id::ActionId;
pub use action_payload::{
    ActionPayload, AddCommentPayload, CreatePostPayload, DeleteMessagePayload,
    EditMessagePayload, FollowUserPayload, LikePostPayload, SendMessagePayload,
    UploadStoryPayload,
};
pub use action_status::ActionStatus;
pub use action_type::ActionType;
pub use client_token::ClientToken;
pub use conversation_id::ConversationId;
pub use message_id::{MessageId, PROVISIONAL_PREFIX};
