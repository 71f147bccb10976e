use crate::domain::value_objects::{ActionId, ActionPayload, ActionStatus, ActionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 未確定のユーザー操作 1 件。ペイロードはエンキュー後に変更されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub action_id: ActionId,
    pub payload: ActionPayload,
    pub status: ActionStatus,
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub server_id: Option<String>,
    pub last_error: Option<String>,
}

impl PendingAction {
    pub fn action_type(&self) -> ActionType {
        self.payload.action_type()
    }

    /// バックオフ待ちでなければ配信対象
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ActionStatus::Pending
            && self.next_attempt_at.map_or(true, |next| next <= now)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxSummary {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub oldest_pending_at: Option<DateTime<Utc>>,
}
