use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub image_ref: Option<String>,
    pub post_ref: Option<String>,
    pub kind: String,
    pub edited: bool,
    pub edited_at: Option<i64>,
    pub deleted: bool,
    pub created_at: i64,
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProvisionalEchoRow {
    #[sqlx(flatten)]
    pub message: MessageRow,
    pub delivered_server_id: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    pub media_ref: Option<String>,
    pub caption: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked_by_me: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct StoryRow {
    pub story_id: String,
    pub author_id: String,
    pub author_name: String,
    pub media_ref: String,
    pub caption: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PendingActionRow {
    pub action_id: i64,
    pub action_type: String,
    pub payload: String,
    pub status: String,
    pub retry_count: i64,
    pub enqueued_at: i64,
    pub updated_at: i64,
    pub next_attempt_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub server_id: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OutboxCountRow {
    pub status: String,
    pub count: i64,
}
