use crate::application::ports::local_store::LocalStore;
use crate::application::ports::reachability::ReachabilityProbe;
use crate::application::ports::remote_api::RemoteApiClient;
use crate::application::services::{
    ConversationPoller, FlushReport, HousekeepingReport, OutboxEvent, OutboxService,
    OutgoingMessage, PollHandle, QueuedMessage, Reconciler, SyncEngine, SyncSettings, SyncStatus,
    SyncWorkerHandle,
};
use crate::domain::entities::{
    CachedMessage, CachedPost, CachedStory, OutboxSummary, PendingAction,
};
use crate::domain::value_objects::{ActionId, MessageId};
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::network::{NetworkMonitor, ReachabilitySubscription};
use crate::infrastructure::offline::DeliveryMetricsSnapshot;
use crate::infrastructure::store::SqliteLocalStore;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

/// キャッシュとアウトボックスの組み立て。UI 層はこれだけを持てばよい。
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn LocalStore>,
    pub monitor: NetworkMonitor,
    pub sync_engine: Arc<SyncEngine>,
    pub outbox: Arc<OutboxService>,
    pub reconciler: Arc<Reconciler>,
    poller: ConversationPoller,
    remote: Arc<dyn RemoteApiClient>,
    pool: ConnectionPool,
    worker: Arc<Mutex<Option<SyncWorkerHandle>>>,
}

impl AppState {
    pub async fn new(
        config: AppConfig,
        remote: Arc<dyn RemoteApiClient>,
        monitor: NetworkMonitor,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let pool = ConnectionPool::new(&config.database).await?;
        pool.migrate().await?;
        tracing::info!(target: "offline::state", url = %config.database.url, "local store ready");

        Ok(Self::with_pool(config, pool, remote, monitor))
    }

    /// マイグレーション済みのプールから組み立てる
    pub fn with_pool(
        config: AppConfig,
        pool: ConnectionPool,
        remote: Arc<dyn RemoteApiClient>,
        monitor: NetworkMonitor,
    ) -> Self {
        let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool.clone()));
        let reachability: Arc<dyn ReachabilityProbe> = Arc::new(monitor.clone());

        let sync_engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            reachability,
            SyncSettings::from_config(&config),
        ));
        let outbox = Arc::new(OutboxService::new(
            Arc::clone(&store),
            sync_engine.event_sender(),
            config.cache.edit_window(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            config.cache.echo_match_window(),
        ));
        let poller = ConversationPoller::new(
            Arc::clone(&remote),
            Arc::clone(&reconciler),
            Arc::clone(&sync_engine),
            Duration::from_secs(config.cache.poll_interval),
        );

        Self {
            config: Arc::new(config),
            store,
            monitor,
            sync_engine,
            outbox,
            reconciler,
            poller,
            remote,
            pool,
            worker: Arc::new(Mutex::new(None)),
        }
    }

    /// 到達性の回復・定期同期・掃除を行うワーカーを起動する。起動済みなら何もしない。
    pub async fn start_background_sync(&self) {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|handle| handle.is_running()) {
            return;
        }
        *worker = Some(self.sync_engine.spawn());
        tracing::info!(target: "offline::state", "background sync started");
    }

    pub async fn shutdown(&self) {
        if let Some(mut handle) = self.worker.lock().await.take() {
            handle.stop();
        }
        self.pool.close().await;
        tracing::info!(target: "offline::state", "offline cache shut down");
    }

    // 書き込み

    pub async fn queue_send_message(
        &self,
        message: OutgoingMessage,
    ) -> Result<QueuedMessage, AppError> {
        self.outbox.queue_send_message(message).await
    }

    pub async fn queue_create_post(
        &self,
        caption: impl Into<String>,
        media_ref: Option<String>,
    ) -> Result<ActionId, AppError> {
        self.outbox.queue_create_post(caption, media_ref).await
    }

    pub async fn queue_upload_story(
        &self,
        media_ref: impl Into<String>,
        caption: Option<String>,
    ) -> Result<ActionId, AppError> {
        self.outbox.queue_upload_story(media_ref, caption).await
    }

    pub async fn queue_like_post(
        &self,
        post_id: impl Into<String>,
        liked: bool,
    ) -> Result<ActionId, AppError> {
        self.outbox.queue_like_post(post_id, liked).await
    }

    pub async fn queue_add_comment(
        &self,
        post_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<ActionId, AppError> {
        self.outbox.queue_add_comment(post_id, body).await
    }

    pub async fn queue_follow_user(
        &self,
        target_user_id: impl Into<String>,
        follow: bool,
    ) -> Result<ActionId, AppError> {
        self.outbox.queue_follow_user(target_user_id, follow).await
    }

    pub async fn queue_edit_message(
        &self,
        message_id: &MessageId,
        body: impl Into<String>,
    ) -> Result<CachedMessage, AppError> {
        self.outbox.queue_edit_message(message_id, body).await
    }

    pub async fn queue_delete_message(
        &self,
        message_id: &MessageId,
    ) -> Result<CachedMessage, AppError> {
        self.outbox.queue_delete_message(message_id).await
    }

    // 読み出し

    pub async fn get_messages(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<CachedMessage>, AppError> {
        self.store.get_messages(user_a, user_b).await
    }

    pub async fn get_active_stories(&self) -> Result<Vec<CachedStory>, AppError> {
        self.store.get_active_stories().await
    }

    pub async fn get_posts(&self, limit: Option<u32>) -> Result<Vec<CachedPost>, AppError> {
        let limit = limit.unwrap_or(self.config.cache.feed_page_size);
        self.store.get_posts(limit).await
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_reachable()
    }

    pub fn subscribe_reachability<F>(&self, callback: F) -> ReachabilitySubscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.monitor.subscribe(callback)
    }

    // 同期

    pub async fn trigger_sync(&self) -> Result<FlushReport, AppError> {
        self.sync_engine.trigger_sync().await
    }

    pub fn subscribe_outbox(&self) -> broadcast::Receiver<OutboxEvent> {
        self.sync_engine.subscribe()
    }

    pub async fn failed_actions(&self) -> Result<Vec<PendingAction>, AppError> {
        self.store.list_failed_actions().await
    }

    /// 失敗した操作を pending に戻し、すぐに送出を試みる
    pub async fn retry_action(&self, action_id: ActionId) -> Result<FlushReport, AppError> {
        self.store.reset_action(action_id).await?;
        tracing::info!(
            target: "offline::state",
            action_id = action_id.value(),
            "failed action re-queued"
        );
        self.sync_engine.trigger_sync().await
    }

    pub async fn discard_action(&self, action_id: ActionId) -> Result<(), AppError> {
        self.store.discard_action(action_id).await?;
        tracing::info!(
            target: "offline::state",
            action_id = action_id.value(),
            "undelivered action discarded"
        );
        Ok(())
    }

    pub async fn outbox_summary(&self) -> Result<OutboxSummary, AppError> {
        self.store.outbox_summary().await
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.sync_engine.get_status().await
    }

    pub fn delivery_metrics(&self) -> DeliveryMetricsSnapshot {
        self.sync_engine.metrics()
    }

    pub async fn run_housekeeping(&self) -> Result<HousekeepingReport, AppError> {
        self.sync_engine.run_housekeeping().await
    }

    // 取得と反映

    /// 会話画面を開いている間だけポーリングする
    pub fn open_conversation(
        &self,
        user_a: impl Into<String>,
        user_b: impl Into<String>,
    ) -> PollHandle {
        self.poller.open(user_a, user_b)
    }

    pub async fn refresh_feed(&self) -> Result<Vec<CachedPost>, AppError> {
        let limit = self.config.cache.feed_page_size;
        let posts = self.remote.fetch_feed(limit).await?;
        self.reconciler.reconcile_feed(posts).await?;
        self.store.get_posts(limit).await
    }

    pub async fn refresh_stories(&self, author_id: &str) -> Result<Vec<CachedStory>, AppError> {
        let stories = self.remote.fetch_active_stories(author_id).await?;
        self.reconciler.reconcile_stories(author_id, stories).await?;
        self.store.get_active_stories().await
    }
}
