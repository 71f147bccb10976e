pub mod metrics;

pub use metrics::{DeliveryMetadata, DeliveryMetrics, DeliveryMetricsSnapshot, DeliveryOutcome};
