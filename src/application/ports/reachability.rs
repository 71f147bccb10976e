use tokio::sync::broadcast;

/// 到達性の問い合わせと遷移通知。遷移は重複が除去された状態で配信される。
pub trait ReachabilityProbe: Send + Sync {
    fn is_reachable(&self) -> bool;
    fn transitions(&self) -> broadcast::Receiver<bool>;
}
