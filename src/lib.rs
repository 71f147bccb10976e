//! Offline-first local cache and durable mutation outbox for the Socialite client.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::{
    LocalStore, ReachabilityProbe, RemoteAck, RemoteApiClient, RemoteError,
};
pub use application::services::{OutboxEvent, OutgoingMessage, PollHandle, SyncTrigger};
pub use infrastructure::network::{NetworkMonitor, Transport};
pub use shared::{AppConfig, AppError};
pub use state::AppState;

/// ログ設定の初期化。既に初期化済みなら何もしない。
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "socialite_lib=debug,offline=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
