use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// フィード投稿のスナップショット。サーバーが唯一の書き手なので取得のたびに行ごと置き換える。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPost {
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    pub media_ref: Option<String>,
    pub caption: String,
    pub like_count: u32,
    pub comment_count: u32,
    pub liked_by_me: bool,
    pub created_at: DateTime<Utc>,
}

impl CachedPost {
    /// いいね状態の楽観的反映
    pub fn apply_like(&mut self, liked: bool) {
        if self.liked_by_me == liked {
            return;
        }
        self.liked_by_me = liked;
        self.like_count = if liked {
            self.like_count.saturating_add(1)
        } else {
            self.like_count.saturating_sub(1)
        };
    }
}
