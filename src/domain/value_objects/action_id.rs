use serde::{Deserialize, Serialize};
use std::fmt;

/// アウトボックス行のローカル採番キー。サーバー側では意味を持たない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(i64);

impl ActionId {
    pub fn new(value: i64) -> Result<Self, String> {
        if value <= 0 {
            return Err("Action ID must be positive".to_string());
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ActionId> for i64 {
    fn from(id: ActionId) -> Self {
        id.0
    }
}
