use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// 楽観的エコーに付与する仮 ID の接頭辞。
pub const PROVISIONAL_PREFIX: &str = "local-";

/// キャッシュ済みメッセージの識別子。
///
/// サーバー確定前の行は `local-` で始まる仮 ID を持ち、
/// 次回の取得でサーバー採番の ID を持つ行に置き換えられる。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    /// 新しい仮 ID を発行する
    pub fn provisional() -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Message ID cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

impl FromStr for MessageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}
