use crate::application::ports::local_store::LocalStore;
use crate::application::ports::reachability::ReachabilityProbe;
use crate::application::ports::remote_api::{RemoteAck, RemoteApiClient, RemoteError};
use crate::domain::entities::PendingAction;
use crate::domain::value_objects::{ActionId, ActionPayload, ActionType};
use crate::infrastructure::offline::{
    DeliveryMetadata, DeliveryMetrics, DeliveryMetricsSnapshot, DeliveryOutcome,
};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use crate::shared::time::{now_millis, to_chrono};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// 到達不可から到達可能への遷移
    Reachability,
    Manual,
    /// 会話ポーリング前の機会的な送出
    Poll,
    Interval,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Reachability => "reachability",
            SyncTrigger::Manual => "manual",
            SyncTrigger::Poll => "poll",
            SyncTrigger::Interval => "interval",
        }
    }

    /// 手動同期はバックオフ待ちの操作も送る
    pub fn ignores_backoff(&self) -> bool {
        matches!(self, SyncTrigger::Manual)
    }
}

/// 指数バックオフと試行上限
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// `retry_count` 回目の失敗後に待つ時間: `base * 2^(retry_count - 1)`（上限あり）
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        SyncSettings::default().retry
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub retry: RetryPolicy,
    pub auto_sync: bool,
    pub sync_interval: Duration,
    pub housekeeping_interval: Duration,
    pub completed_retention: Duration,
    pub message_retention: Option<Duration>,
}

impl SyncSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: config.sync.max_retry,
                base_backoff: Duration::from_millis(config.sync.base_backoff_ms),
                max_backoff: Duration::from_millis(config.sync.max_backoff_ms),
            },
            auto_sync: config.sync.auto_sync,
            sync_interval: Duration::from_secs(config.sync.sync_interval.max(1)),
            housekeeping_interval: Duration::from_secs(config.sync.housekeeping_interval.max(1)),
            completed_retention: config.sync.completed_retention(),
            message_retention: config.cache.message_retention(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// アウトボックスの状態変化。UI は `SyncEngine::subscribe` で購読する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboxEvent {
    Enqueued {
        action_id: ActionId,
        action_type: ActionType,
    },
    Delivered {
        action_id: ActionId,
        action_type: ActionType,
        server_id: Option<String>,
    },
    RetryScheduled {
        action_id: ActionId,
        action_type: ActionType,
        retry_count: u32,
        next_attempt_at: Option<DateTime<Utc>>,
        error: String,
    },
    Failed {
        action_id: ActionId,
        action_type: ActionType,
        error: String,
    },
    PassCompleted(FlushReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub trigger: SyncTrigger,
    pub attempted: u32,
    pub delivered: u32,
    pub retried: u32,
    pub failed: u32,
    /// バックオフ待ちで見送った件数
    pub deferred: u32,
    /// 開始時点で到達不可、もしくは途中でオフラインになり打ち切った
    pub halted_offline: bool,
}

impl FlushReport {
    fn new(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            attempted: 0,
            delivered: 0,
            retried: 0,
            failed: 0,
            deferred: 0,
            halted_offline: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HousekeepingReport {
    pub completed_purged: u64,
    pub stories_purged: u64,
    pub messages_purged: u64,
}

#[derive(Debug, Clone, Default, Serialize, serde::Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync: Option<i64>,
    pub last_trigger: Option<String>,
    pub sync_errors: u32,
}

enum FailureOutcome {
    Retried,
    Failed,
}

/// アウトボックスを Remote API へ送出する。
///
/// 送出パスはゲートで直列化され、同時に 2 つ走ることはない。
pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteApiClient>,
    reachability: Arc<dyn ReachabilityProbe>,
    settings: SyncSettings,
    events: broadcast::Sender<OutboxEvent>,
    metrics: DeliveryMetrics,
    status: RwLock<SyncStatus>,
    gate: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteApiClient>,
        reachability: Arc<dyn ReachabilityProbe>,
        settings: SyncSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            store,
            remote,
            reachability,
            settings,
            events,
            metrics: DeliveryMetrics::new(),
            status: RwLock::new(SyncStatus::default()),
            gate: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboxEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<OutboxEvent> {
        self.events.clone()
    }

    pub fn metrics(&self) -> DeliveryMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn get_status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// ユーザー操作による即時同期。バックオフを無視する。
    pub async fn trigger_sync(&self) -> Result<FlushReport, AppError> {
        self.flush(SyncTrigger::Manual).await
    }

    pub async fn flush(&self, trigger: SyncTrigger) -> Result<FlushReport, AppError> {
        let _guard = self.gate.lock().await;

        if !self.reachability.is_reachable() {
            tracing::debug!(
                target: "offline::sync",
                trigger = trigger.as_str(),
                "device offline; flush skipped"
            );
            let mut report = FlushReport::new(trigger);
            report.halted_offline = true;
            return Ok(report);
        }

        self.status.write().await.is_syncing = true;
        let started = Instant::now();
        let result = self.drain(trigger).await;

        let mut status = self.status.write().await;
        status.is_syncing = false;
        status.last_trigger = Some(trigger.as_str().to_string());
        match &result {
            Ok(report) => {
                status.last_sync = Some(now_millis().timestamp_millis());
                drop(status);

                let elapsed = started.elapsed().as_millis() as u64;
                self.metrics.record_pass(elapsed);
                tracing::info!(
                    target: "offline::sync",
                    trigger = trigger.as_str(),
                    attempted = report.attempted,
                    delivered = report.delivered,
                    retried = report.retried,
                    failed = report.failed,
                    deferred = report.deferred,
                    halted_offline = report.halted_offline,
                    duration_ms = elapsed,
                    "outbox flush completed"
                );
                let _ = self.events.send(OutboxEvent::PassCompleted(report.clone()));
            }
            Err(err) => {
                status.sync_errors = status.sync_errors.saturating_add(1);
                tracing::error!(
                    target: "offline::sync",
                    trigger = trigger.as_str(),
                    error = %err,
                    "outbox flush aborted"
                );
            }
        }

        result
    }

    async fn drain(&self, trigger: SyncTrigger) -> Result<FlushReport, AppError> {
        let mut report = FlushReport::new(trigger);
        let now = now_millis();
        let actions = self.store.list_pending_actions().await?;

        for action in actions {
            if !trigger.ignores_backoff() && !action.is_due_at(now) {
                report.deferred += 1;
                continue;
            }

            report.attempted += 1;
            match self.dispatch(&action.payload).await {
                Ok(ack) => {
                    self.store
                        .mark_completed(action.action_id, ack.server_id.clone())
                        .await?;
                    report.delivered += 1;
                    self.metrics.record(
                        DeliveryOutcome::Delivered,
                        metadata_for(&action, trigger, None, None),
                    );
                    tracing::debug!(
                        target: "offline::sync",
                        action_id = action.action_id.value(),
                        action_type = %action.action_type(),
                        server_id = ?ack.server_id,
                        "action delivered"
                    );
                    let _ = self.events.send(OutboxEvent::Delivered {
                        action_id: action.action_id,
                        action_type: action.action_type(),
                        server_id: ack.server_id,
                    });
                }
                Err(err) => {
                    let went_offline = err.indicates_offline() || !self.reachability.is_reachable();
                    match self.record_failure(&action, &err, trigger).await? {
                        FailureOutcome::Retried => report.retried += 1,
                        FailureOutcome::Failed => report.failed += 1,
                    }
                    if went_offline {
                        tracing::info!(
                            target: "offline::sync",
                            action_id = action.action_id.value(),
                            "device went offline; stopping flush"
                        );
                        report.halted_offline = true;
                        break;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn record_failure(
        &self,
        action: &PendingAction,
        err: &RemoteError,
        trigger: SyncTrigger,
    ) -> Result<FailureOutcome, AppError> {
        let message = err.to_string();
        let attempt = action.retry_count.saturating_add(1);

        // オフライン起因の失敗は待機も上限判定もしない。次の接続回復で送る。
        let next_attempt_at = if err.is_retryable() && !err.indicates_offline() {
            Some(now_millis() + to_chrono(self.settings.retry.backoff_for(attempt)))
        } else {
            None
        };

        let retry_count = self
            .store
            .increment_retry(action.action_id, next_attempt_at, &message)
            .await?;

        let terminal = !err.is_retryable()
            || (!err.indicates_offline() && self.settings.retry.is_exhausted(retry_count));

        let backoff_ms = next_attempt_at.map(|next| {
            u64::try_from((next - now_millis()).num_milliseconds().max(0)).unwrap_or(0)
        });
        let metadata = metadata_for(action, trigger, Some(retry_count), Some(message.clone()));

        if terminal {
            self.store.mark_failed(action.action_id, &message).await?;
            self.metrics.record(DeliveryOutcome::Failed, metadata);
            tracing::warn!(
                target: "offline::sync",
                action_id = action.action_id.value(),
                action_type = %action.action_type(),
                retry_count,
                error = %message,
                "action failed permanently"
            );
            let _ = self.events.send(OutboxEvent::Failed {
                action_id: action.action_id,
                action_type: action.action_type(),
                error: message,
            });
            return Ok(FailureOutcome::Failed);
        }

        self.metrics.record(
            DeliveryOutcome::Retried,
            DeliveryMetadata {
                backoff_ms,
                ..metadata
            },
        );
        tracing::debug!(
            target: "offline::sync",
            action_id = action.action_id.value(),
            action_type = %action.action_type(),
            retry_count,
            backoff_ms = ?backoff_ms,
            error = %message,
            "action delivery failed; will retry"
        );
        let _ = self.events.send(OutboxEvent::RetryScheduled {
            action_id: action.action_id,
            action_type: action.action_type(),
            retry_count,
            next_attempt_at,
            error: message,
        });
        Ok(FailureOutcome::Retried)
    }

    async fn dispatch(&self, payload: &ActionPayload) -> Result<RemoteAck, RemoteError> {
        match payload {
            ActionPayload::SendMessage(p) => self.remote.send_message(p).await,
            ActionPayload::CreatePost(p) => self.remote.create_post(p).await,
            ActionPayload::UploadStory(p) => self.remote.upload_story(p).await,
            ActionPayload::LikePost(p) => self.remote.like_post(p).await,
            ActionPayload::AddComment(p) => self.remote.add_comment(p).await,
            ActionPayload::FollowUser(p) => self.remote.follow_user(p).await,
            ActionPayload::EditMessage(p) => self.remote.edit_message(p).await,
            ActionPayload::DeleteMessage(p) => self.remote.delete_message(p).await,
        }
    }

    pub async fn run_housekeeping(&self) -> Result<HousekeepingReport, AppError> {
        let completed_purged = self
            .store
            .purge_completed_older_than(self.settings.completed_retention)
            .await?;
        let stories_purged = self.store.purge_expired_stories().await?;
        let messages_purged = match self.settings.message_retention {
            Some(age) => self.store.purge_messages_older_than(age).await?,
            None => 0,
        };

        let report = HousekeepingReport {
            completed_purged,
            stories_purged,
            messages_purged,
        };
        tracing::info!(
            target: "offline::housekeeping",
            completed = report.completed_purged,
            stories = report.stories_purged,
            messages = report.messages_purged,
            "cache housekeeping finished"
        );
        Ok(report)
    }

    async fn run_flush_logged(&self, trigger: SyncTrigger) {
        // 失敗は flush 内で記録済み
        let _ = self.flush(trigger).await;
    }

    /// 到達性の回復と定期タイマーで送出・掃除を行うワーカーを起動する
    pub fn spawn(self: &Arc<Self>) -> SyncWorkerHandle {
        let engine = Arc::clone(self);
        let mut transitions = self.reachability.transitions();

        let task = tokio::spawn(async move {
            let mut sync_tick = tokio::time::interval(engine.settings.sync_interval);
            sync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut housekeeping_tick =
                tokio::time::interval(engine.settings.housekeeping_interval);
            housekeeping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let auto_sync = engine.settings.auto_sync;

            loop {
                tokio::select! {
                    transition = transitions.recv() => match transition {
                        Ok(true) => engine.run_flush_logged(SyncTrigger::Reachability).await,
                        Ok(false) => {}
                        Err(RecvError::Lagged(_)) => {
                            if engine.reachability.is_reachable() {
                                engine.run_flush_logged(SyncTrigger::Reachability).await;
                            }
                        }
                        Err(RecvError::Closed) => {
                            tracing::debug!(target: "offline::sync", "reachability source closed");
                            break;
                        }
                    },
                    _ = sync_tick.tick(), if auto_sync => {
                        engine.run_flush_logged(SyncTrigger::Interval).await;
                    }
                    _ = housekeeping_tick.tick() => {
                        if let Err(err) = engine.run_housekeeping().await {
                            tracing::error!(
                                target: "offline::housekeeping",
                                error = %err,
                                "cache housekeeping failed"
                            );
                        }
                    }
                }
            }
        });

        SyncWorkerHandle { task: Some(task) }
    }
}

fn metadata_for(
    action: &PendingAction,
    trigger: SyncTrigger,
    retry_count: Option<u32>,
    error: Option<String>,
) -> DeliveryMetadata {
    DeliveryMetadata {
        action_id: Some(action.action_id.value()),
        action_type: Some(action.action_type().as_str().to_string()),
        trigger: Some(trigger.as_str().to_string()),
        retry_count,
        backoff_ms: None,
        error,
    }
}

/// `SyncEngine::spawn` が返すハンドル。破棄時にワーカーを止める。
pub struct SyncWorkerHandle {
    task: Option<JoinHandle<()>>,
}

impl SyncWorkerHandle {
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SyncWorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
