pub mod monitor;

pub use monitor::{NetworkMonitor, ReachabilitySubscription, Transport};
