mod common;

use common::{test_config, MockRemoteApi};
use socialite_lib::domain::value_objects::ActionType;
use socialite_lib::{AppConfig, AppState, NetworkMonitor, OutgoingMessage, RemoteApiClient};
use std::path::Path;
use std::sync::Arc;

fn file_config(path: &Path) -> AppConfig {
    let mut config = test_config();
    config.database.url = format!("sqlite://{}", path.display());
    config.database.max_connections = 2;
    config
}

async fn open(config: AppConfig, remote: &MockRemoteApi, online: bool) -> AppState {
    let client: Arc<dyn RemoteApiClient> = Arc::new(remote.clone());
    AppState::new(config, client, NetworkMonitor::new(online))
        .await
        .expect("app state")
}

#[tokio::test]
async fn outbox_survives_restart() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("nested").join("cache.db");
    let remote = MockRemoteApi::new();

    let state = open(file_config(&path), &remote, false).await;
    let queued = state
        .queue_send_message(OutgoingMessage::text("alice", "bob", "written offline"))
        .await
        .unwrap();
    state.queue_like_post("p-3", true).await.unwrap();
    state.shutdown().await;

    let reopened = open(file_config(&path), &remote, true).await;
    let pending = reopened.store.list_pending_actions().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].action_id, queued.action_id);
    assert_eq!(pending[0].action_type(), ActionType::SendMessage);

    let messages = reopened.get_messages("alice", "bob").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_id, queued.echo.message_id);

    let report = reopened.trigger_sync().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(
        remote.call_types().await,
        vec![ActionType::SendMessage, ActionType::LikePost]
    );
    reopened.shutdown().await;
}

#[tokio::test]
async fn invalid_config_is_rejected_before_opening_storage() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("never.db");
    let mut config = file_config(&path);
    config.sync.max_retry = 0;

    let client: Arc<dyn RemoteApiClient> = Arc::new(MockRemoteApi::new());
    let result = AppState::new(config, client, NetworkMonitor::new(true)).await;

    assert!(matches!(
        result,
        Err(socialite_lib::AppError::ConfigurationError(_))
    ));
    assert!(!path.exists());
}
