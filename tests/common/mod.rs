#![allow(dead_code)]

pub mod mocks;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use socialite_lib::domain::entities::{CachedMessage, CachedPost, CachedStory, MessageKind};
use socialite_lib::domain::value_objects::{ClientToken, MessageId};
use socialite_lib::infrastructure::database::ConnectionPool;
use socialite_lib::{AppConfig, AppState, NetworkMonitor, RemoteApiClient};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use mocks::MockRemoteApi;

pub struct TestContext {
    pub state: AppState,
    pub remote: MockRemoteApi,
    pub monitor: NetworkMonitor,
}

/// テスト向けの設定。自動同期は止め、バックオフは短くする。
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.sync.auto_sync = false;
    config.sync.max_retry = 3;
    config.sync.base_backoff_ms = 10;
    config.sync.max_backoff_ms = 100;
    config.cache.poll_interval = 1;
    config
}

pub async fn setup(online: bool) -> TestContext {
    setup_with_config(test_config(), online).await
}

pub async fn setup_with_config(config: AppConfig, online: bool) -> TestContext {
    let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
    pool.migrate().await.expect("migrations");

    let remote = MockRemoteApi::new();
    let monitor = NetworkMonitor::new(online);
    let client: Arc<dyn RemoteApiClient> = Arc::new(remote.clone());
    let state = AppState::with_pool(config, pool, client, monitor.clone());

    TestContext {
        state,
        remote,
        monitor,
    }
}

/// 条件が満たされるまで短い間隔で待つ。2 秒で諦める。
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

pub fn server_message(
    id: &str,
    sender: &str,
    receiver: &str,
    body: &str,
    created_at: DateTime<Utc>,
) -> CachedMessage {
    CachedMessage::new(
        MessageId::new(id.to_string()).expect("message id"),
        sender,
        receiver,
        body,
        MessageKind::Text,
        created_at,
    )
}

pub fn server_echo_of(id: &str, echo: &CachedMessage, token: Option<ClientToken>) -> CachedMessage {
    let mut message = server_message(
        id,
        &echo.sender_id,
        &echo.receiver_id,
        &echo.body,
        echo.created_at,
    );
    message.client_token = token;
    message
}

pub fn post(id: &str, created_at: DateTime<Utc>) -> CachedPost {
    CachedPost {
        post_id: id.to_string(),
        author_id: "carol".to_string(),
        author_name: "Carol".to_string(),
        media_ref: Some(format!("media/{id}.jpg")),
        caption: format!("caption {id}"),
        like_count: 3,
        comment_count: 1,
        liked_by_me: false,
        created_at,
    }
}

pub fn story(id: &str, author: &str, expires_in: ChronoDuration) -> CachedStory {
    let now = Utc::now();
    CachedStory {
        story_id: id.to_string(),
        author_id: author.to_string(),
        author_name: author.to_uppercase(),
        media_ref: format!("stories/{id}.mp4"),
        caption: None,
        created_at: now - ChronoDuration::hours(1),
        expires_at: now + expires_in,
    }
}
