use serde::{Deserialize, Serialize};
use std::fmt;

/// エンキュー時に発行する相関トークン。
///
/// Remote API に渡され、サーバー行に返ってくれば楽観的エコーとの照合が
/// 完全一致で行える。サーバー側の冪等キーとしても使える。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientToken(String);

impl ClientToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(value: String) -> Result<Self, String> {
        if value.trim().is_empty() {
            return Err("Client token cannot be empty".to_string());
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
