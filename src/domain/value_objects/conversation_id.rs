use serde::{Deserialize, Serialize};
use std::fmt;

/// 二者間会話のスコープキー。参加者の順序に依存しない。
///
/// 形式は `{小さい方の文字数}:{小さい方}:{大きい方}`。ID に `:` が含まれても
/// 別の組と衝突しない。文字数は SQLite の `length()` と同じく文字単位で数える。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn for_pair(user_a: &str, user_b: &str) -> Self {
        let (low, high) = if user_a <= user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };
        Self(format!("{}:{low}:{high}", low.chars().count()))
    }

    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
