use super::CachedMessage;
use crate::domain::value_objects::MessageId;

/// 会話内の仮 ID 行。送信アクションが完了していればサーバー採番 ID を伴う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalEcho {
    pub message: CachedMessage,
    pub delivered_server_id: Option<String>,
}

/// 取得結果をローカルストアへ反映する計画。1 トランザクションで適用される。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageReconciliation {
    pub upserts: Vec<CachedMessage>,
    pub superseded: Vec<MessageId>,
}

impl MessageReconciliation {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.superseded.is_empty()
    }
}
