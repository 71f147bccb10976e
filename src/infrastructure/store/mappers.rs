use super::rows::{MessageRow, PendingActionRow, PostRow, ProvisionalEchoRow, StoryRow};
use crate::domain::entities::{
    CachedMessage, CachedPost, CachedStory, MessageKind, PendingAction, ProvisionalEcho,
};
use crate::domain::value_objects::{
    ActionId, ActionPayload, ActionStatus, ActionType, ClientToken, ConversationId, MessageId,
};
use crate::shared::error::AppError;
use crate::shared::time::from_millis;
use std::str::FromStr;

pub fn message_from_row(row: MessageRow) -> Result<CachedMessage, AppError> {
    let message_id = MessageId::new(row.message_id).map_err(AppError::DeserializationError)?;
    let kind = MessageKind::from_str(&row.kind).map_err(AppError::DeserializationError)?;
    let client_token = row
        .client_token
        .map(ClientToken::new)
        .transpose()
        .map_err(AppError::DeserializationError)?;

    Ok(CachedMessage {
        message_id,
        conversation_id: ConversationId::from_stored(row.conversation_id),
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        body: row.body,
        image_ref: row.image_ref,
        post_ref: row.post_ref,
        kind,
        edited: row.edited,
        edited_at: row.edited_at.map(from_millis),
        deleted: row.deleted,
        created_at: from_millis(row.created_at),
        client_token,
    })
}

pub fn echo_from_row(row: ProvisionalEchoRow) -> Result<ProvisionalEcho, AppError> {
    Ok(ProvisionalEcho {
        message: message_from_row(row.message)?,
        delivered_server_id: row.delivered_server_id,
    })
}

pub fn post_from_row(row: PostRow) -> CachedPost {
    CachedPost {
        post_id: row.post_id,
        author_id: row.author_id,
        author_name: row.author_name,
        media_ref: row.media_ref,
        caption: row.caption,
        like_count: count_from_i64(row.like_count),
        comment_count: count_from_i64(row.comment_count),
        liked_by_me: row.liked_by_me,
        created_at: from_millis(row.created_at),
    }
}

pub fn story_from_row(row: StoryRow) -> CachedStory {
    CachedStory {
        story_id: row.story_id,
        author_id: row.author_id,
        author_name: row.author_name,
        media_ref: row.media_ref,
        caption: row.caption,
        created_at: from_millis(row.created_at),
        expires_at: from_millis(row.expires_at),
    }
}

pub fn action_from_row(row: PendingActionRow) -> Result<PendingAction, AppError> {
    let action_id = ActionId::new(row.action_id).map_err(AppError::DeserializationError)?;
    let action_type =
        ActionType::from_str(&row.action_type).map_err(AppError::DeserializationError)?;
    let payload = ActionPayload::from_stored(action_type, &row.payload)
        .map_err(AppError::DeserializationError)?;
    let status = ActionStatus::from_str(&row.status).map_err(AppError::DeserializationError)?;

    Ok(PendingAction {
        action_id,
        payload,
        status,
        retry_count: count_from_i64(row.retry_count),
        enqueued_at: from_millis(row.enqueued_at),
        updated_at: from_millis(row.updated_at),
        next_attempt_at: row.next_attempt_at.map(from_millis),
        completed_at: row.completed_at.map(from_millis),
        server_id: row.server_id,
        last_error: row.last_error,
    })
}

pub fn count_from_i64(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_is_a_decode_error() {
        let row = MessageRow {
            message_id: "m1".into(),
            conversation_id: "1:a:b".into(),
            sender_id: "a".into(),
            receiver_id: "b".into(),
            body: "hi".into(),
            image_ref: None,
            post_ref: None,
            kind: "voice".into(),
            edited: false,
            edited_at: None,
            deleted: false,
            created_at: 0,
            client_token: None,
        };
        assert!(matches!(
            message_from_row(row),
            Err(AppError::DeserializationError(_))
        ));
    }

    #[test]
    fn negative_counts_clamp_to_zero() {
        assert_eq!(count_from_i64(-3), 0);
        assert_eq!(count_from_i64(i64::MAX), u32::MAX);
    }
}
