use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Retried,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMetricsSnapshot {
    pub total_delivered: u64,
    pub total_retried: u64,
    pub total_failed: u64,
    pub consecutive_failure: u64,
    pub flush_passes: u64,
    pub last_delivered_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<DeliveryOutcome>,
    pub last_action_id: Option<i64>,
    pub last_action_type: Option<String>,
    pub last_trigger: Option<String>,
    pub last_retry_count: Option<u32>,
    pub last_backoff_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_pass_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMetadata {
    pub action_id: Option<i64>,
    pub action_type: Option<String>,
    pub trigger: Option<String>,
    pub retry_count: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Default, Clone)]
struct LastDelivery {
    outcome: Option<DeliveryOutcome>,
    metadata: DeliveryMetadata,
    pass_duration_ms: Option<u64>,
}

/// 配信結果の集計。`SyncEngine` ごとに 1 つ保持する。
pub struct DeliveryMetrics {
    delivered: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    consecutive_failure: AtomicU64,
    flush_passes: AtomicU64,
    last_delivered_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    last: Mutex<LastDelivery>,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self {
            delivered: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            consecutive_failure: AtomicU64::new(0),
            flush_passes: AtomicU64::new(0),
            last_delivered_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            last: Mutex::new(LastDelivery::default()),
        }
    }

    pub fn record(&self, outcome: DeliveryOutcome, metadata: DeliveryMetadata) {
        match outcome {
            DeliveryOutcome::Delivered => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.last_delivered_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.store(0, Ordering::Relaxed);
            }
            DeliveryOutcome::Retried | DeliveryOutcome::Failed => {
                if outcome == DeliveryOutcome::Retried {
                    self.retried.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
                self.last_failure_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut guard) = self.last.lock() {
            guard.outcome = Some(outcome);
            guard.metadata = metadata;
        }
    }

    pub fn record_pass(&self, duration_ms: u64) {
        self.flush_passes.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last.lock() {
            guard.pass_duration_ms = Some(duration_ms);
        }
    }

    pub fn snapshot(&self) -> DeliveryMetricsSnapshot {
        let last = self
            .last
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        DeliveryMetricsSnapshot {
            total_delivered: self.delivered.load(Ordering::Relaxed),
            total_retried: self.retried.load(Ordering::Relaxed),
            total_failed: self.failed.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            flush_passes: self.flush_passes.load(Ordering::Relaxed),
            last_delivered_ms: to_option(self.last_delivered_ms.load(Ordering::Relaxed)),
            last_failure_ms: to_option(self.last_failure_ms.load(Ordering::Relaxed)),
            last_outcome: last.outcome,
            last_action_id: last.metadata.action_id,
            last_action_type: last.metadata.action_type,
            last_trigger: last.metadata.trigger,
            last_retry_count: last.metadata.retry_count,
            last_backoff_ms: last.metadata.backoff_ms,
            last_error: last.metadata.error,
            last_pass_duration_ms: last.pass_duration_ms,
        }
    }
}

impl Default for DeliveryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_option(value: u64) -> Option<u64> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_delivery_and_failures() {
        let metrics = DeliveryMetrics::new();
        metrics.record(
            DeliveryOutcome::Retried,
            DeliveryMetadata {
                action_id: Some(1),
                action_type: Some("send_message".into()),
                trigger: Some("reachability".into()),
                retry_count: Some(1),
                backoff_ms: Some(2_000),
                error: Some("server error 503".into()),
            },
        );
        metrics.record(
            DeliveryOutcome::Failed,
            DeliveryMetadata {
                action_id: Some(2),
                ..DeliveryMetadata::default()
            },
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_retried, 1);
        assert_eq!(snapshot.total_failed, 1);
        assert_eq!(snapshot.consecutive_failure, 2);
        assert_eq!(snapshot.last_outcome, Some(DeliveryOutcome::Failed));
        assert_eq!(snapshot.last_action_id, Some(2));
        assert!(snapshot.last_failure_ms.is_some());
        assert!(snapshot.last_delivered_ms.is_none());

        metrics.record(
            DeliveryOutcome::Delivered,
            DeliveryMetadata {
                action_id: Some(3),
                ..DeliveryMetadata::default()
            },
        );
        metrics.record_pass(15);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_delivered, 1);
        assert_eq!(snapshot.consecutive_failure, 0);
        assert_eq!(snapshot.flush_passes, 1);
        assert_eq!(snapshot.last_pass_duration_ms, Some(15));
    }
}
