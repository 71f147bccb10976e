use crate::application::ports::reachability::ReachabilityProbe;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const TRANSITION_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Wifi,
    Cellular,
    Wired,
    /// 集約フラグしか提供しないプラットフォーム向け
    Other,
}

/// プラットフォームの接続コールバックを集約し、到達性の遷移を配信する。
///
/// いずれかのトランスポートが有効であれば到達可能とみなす。
/// 同じ状態の再通知は購読者に届かない。
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    transports: Mutex<HashSet<Transport>>,
    state: watch::Sender<bool>,
    transitions: broadcast::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(initially_reachable: bool) -> Self {
        let mut transports = HashSet::new();
        if initially_reachable {
            transports.insert(Transport::Other);
        }
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            inner: Arc::new(MonitorInner {
                transports: Mutex::new(transports),
                state: watch::Sender::new(initially_reachable),
                transitions,
            }),
        }
    }

    /// トランスポート単位の状態変化を取り込む
    pub fn report_transport(&self, transport: Transport, available: bool) {
        let Ok(mut transports) = self.inner.transports.lock() else {
            tracing::error!(target: "offline::network", "transport table poisoned");
            return;
        };
        if available {
            transports.insert(transport);
        } else {
            transports.remove(&transport);
        }
        let reachable = !transports.is_empty();
        // ロックを保持したまま配信し、遷移の順序を保つ
        self.publish(reachable, Some(transport));
    }

    /// 集約された到達性を直接設定する。既存のトランスポート情報は破棄される。
    pub fn set_reachable(&self, reachable: bool) {
        let Ok(mut transports) = self.inner.transports.lock() else {
            tracing::error!(target: "offline::network", "transport table poisoned");
            return;
        };
        transports.clear();
        if reachable {
            transports.insert(Transport::Other);
        }
        self.publish(reachable, None);
    }

    fn publish(&self, reachable: bool, transport: Option<Transport>) {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });
        if !changed {
            return;
        }
        tracing::info!(
            target: "offline::network",
            reachable,
            transport = ?transport,
            "reachability changed"
        );
        // 受信者がいなければ送信は失敗するが問題ない
        let _ = self.inner.transitions.send(reachable);
    }

    pub fn is_reachable(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// 遷移ごとに `callback` を呼ぶ。tokio ランタイム上で呼び出すこと。
    pub fn subscribe<F>(&self, callback: F) -> ReachabilitySubscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut receiver = self.inner.transitions.subscribe();
        let state = self.inner.state.subscribe();
        let task = tokio::spawn(async move {
            let mut last_delivered: Option<bool> = None;
            loop {
                match receiver.recv().await {
                    Ok(reachable) => {
                        if last_delivered != Some(reachable) {
                            last_delivered = Some(reachable);
                            callback(reachable);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: "offline::network",
                            skipped,
                            "reachability subscriber lagged"
                        );
                        let current = *state.borrow();
                        if last_delivered != Some(current) {
                            last_delivered = Some(current);
                            callback(current);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        ReachabilitySubscription { task: Some(task) }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ReachabilityProbe for NetworkMonitor {
    fn is_reachable(&self) -> bool {
        NetworkMonitor::is_reachable(self)
    }

    fn transitions(&self) -> broadcast::Receiver<bool> {
        self.inner.transitions.subscribe()
    }
}

/// `subscribe` の戻り値。破棄時にも購読を解除する。
pub struct ReachabilitySubscription {
    task: Option<JoinHandle<()>>,
}

impl ReachabilitySubscription {
    /// 何度呼んでもよい
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ReachabilitySubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
