use super::reconciler::Reconciler;
use super::sync_service::{SyncEngine, SyncTrigger};
use crate::application::ports::remote_api::RemoteApiClient;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 開いている会話を一定間隔で取得し、キャッシュへ反映する
#[derive(Clone)]
pub struct ConversationPoller {
    remote: Arc<dyn RemoteApiClient>,
    reconciler: Arc<Reconciler>,
    engine: Arc<SyncEngine>,
    interval: Duration,
}

impl ConversationPoller {
    pub fn new(
        remote: Arc<dyn RemoteApiClient>,
        reconciler: Arc<Reconciler>,
        engine: Arc<SyncEngine>,
        interval: Duration,
    ) -> Self {
        Self {
            remote,
            reconciler,
            engine,
            interval,
        }
    }

    /// 会話画面に紐づくポーリングを開始する。ハンドルを破棄すると止まる。
    pub fn open(&self, user_a: impl Into<String>, user_b: impl Into<String>) -> PollHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let poller = self.clone();
        let user_a = user_a.into();
        let user_b = user_b.into();

        let task = tokio::spawn(async move {
            poller.run(user_a, user_b, stop_rx).await;
        });

        PollHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }

    async fn run(self, user_a: String, user_b: String, mut stop: watch::Receiver<bool>) {
        let mut since: Option<DateTime<Utc>> = None;
        loop {
            if *stop.borrow() {
                break;
            }
            match self.poll_once(&user_a, &user_b, since, &stop).await {
                Ok(Some(latest)) => since = Some(since.map_or(latest, |prev| prev.max(latest))),
                Ok(None) => {}
                Err(err) => tracing::warn!(
                    target: "offline::poller",
                    user_a = %user_a,
                    user_b = %user_b,
                    error = %err,
                    "conversation poll failed"
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = stop.changed() => {
                    // 送信側が消えた場合も停止とみなす
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(target: "offline::poller", user_a = %user_a, user_b = %user_b, "poller stopped");
    }

    /// 1 回分の取得と反映。停止後に完了した取得結果は捨てる。
    /// 停止フラグは書き込み直前にも確認する。開始済みのトランザクションは最後まで走る。
    /// 反映した行の最新 `created_at` を返す。
    pub async fn poll_once(
        &self,
        user_a: &str,
        user_b: &str,
        since: Option<DateTime<Utc>>,
        stop: &watch::Receiver<bool>,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        if let Err(err) = self.engine.flush(SyncTrigger::Poll).await {
            tracing::debug!(target: "offline::poller", error = %err, "opportunistic flush failed");
        }

        let fetched = self.remote.fetch_messages(user_a, user_b, since).await?;
        if Self::stopped(stop, fetched.len()) {
            return Ok(None);
        }

        let latest = fetched.iter().map(|message| message.created_at).max();
        let plan = self
            .reconciler
            .plan_messages(user_a, user_b, fetched)
            .await?;
        if Self::stopped(stop, plan.upserts.len()) {
            return Ok(None);
        }

        self.reconciler
            .apply_messages(user_a, user_b, &plan)
            .await?;
        Ok(latest)
    }

    fn stopped(stop: &watch::Receiver<bool>, discarded: usize) -> bool {
        if !*stop.borrow() {
            return false;
        }
        tracing::debug!(
            target: "offline::poller",
            discarded,
            "poll finished after stop; discarding results"
        );
        true
    }
}

/// `ConversationPoller::open` の戻り値
pub struct PollHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// 以降の取得を止める。実行中の取得結果は反映されない。
    /// 書き込みを始めていた場合はそのトランザクションだけ完了する。
    pub fn stop(&mut self) {
        self.stop.send_replace(true);
        // タスクは停止フラグを見て自ら終了する。書き込み途中で中断させない。
        self.task.take();
    }

    /// 停止を通知し、タスクの終了を待つ。戻った後に書き込みは起きない。
    pub async fn shutdown(mut self) {
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(target: "offline::poller", error = %err, "poller task ended abnormally");
            }
        }
    }

    pub fn is_active(&self) -> bool {
        !*self.stop.borrow() && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
