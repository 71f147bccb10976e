use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    /// 定期同期の間隔（秒）
    pub sync_interval: u64,
    /// 失敗扱いにするまでの配信試行回数
    pub max_retry: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// completed 状態のアクションを保持する時間
    pub completed_retention_hours: u64,
    pub housekeeping_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub feed_page_size: u32,
    pub poll_interval: u64,
    /// 楽観的エコーとサーバー行を突き合わせる許容時間差（秒）
    pub echo_match_window: u64,
    /// メッセージの編集・削除が可能な時間（秒）
    pub edit_window: u64,
    #[serde(default)]
    pub message_retention_days: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let url = dirs::data_local_dir()
            .map(|dir| dir.join("socialite").join("socialite.db"))
            .map(|path| format!("sqlite://{}", path.display()))
            .unwrap_or_else(|| "sqlite:data/socialite.db".to_string());
        Self {
            url,
            max_connections: 5,
            connection_timeout: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval: 300, // 5 minutes
            max_retry: 8,
            base_backoff_ms: 2_000,
            max_backoff_ms: 10 * 60 * 1_000,
            completed_retention_hours: 48,
            housekeeping_interval: 3600,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feed_page_size: 50,
            poll_interval: 3,
            echo_match_window: 120,
            edit_window: 300,
            message_retention_days: None,
        }
    }
}

impl SyncConfig {
    pub fn completed_retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_hours * 3600)
    }
}

impl CacheConfig {
    pub fn edit_window(&self) -> Duration {
        Duration::from_secs(self.edit_window)
    }

    pub fn echo_match_window(&self) -> Duration {
        Duration::from_secs(self.echo_match_window)
    }

    pub fn message_retention(&self) -> Option<Duration> {
        self.message_retention_days
            .map(|days| Duration::from_secs(days * 24 * 3600))
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SOCIALITE_DATABASE_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.database.url = trimmed.to_string();
            }
        }
        if let Some(value) = env_u64("SOCIALITE_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value.min(u32::MAX as u64) as u32;
        }

        if let Ok(v) = std::env::var("SOCIALITE_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("SOCIALITE_SYNC_INTERVAL_SECS") {
            cfg.sync.sync_interval = value.max(1);
        }
        if let Some(value) = env_u64("SOCIALITE_SYNC_MAX_RETRY") {
            cfg.sync.max_retry = value.min(u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("SOCIALITE_SYNC_BASE_BACKOFF_MS") {
            cfg.sync.base_backoff_ms = value;
        }
        if let Some(value) = env_u64("SOCIALITE_SYNC_MAX_BACKOFF_MS") {
            cfg.sync.max_backoff_ms = value;
        }
        if let Some(value) = env_u64("SOCIALITE_COMPLETED_RETENTION_HOURS") {
            cfg.sync.completed_retention_hours = value;
        }

        if let Some(value) = env_u64("SOCIALITE_FEED_PAGE_SIZE") {
            cfg.cache.feed_page_size = value.clamp(1, 500) as u32;
        }
        if let Some(value) = env_u64("SOCIALITE_POLL_INTERVAL_SECS") {
            cfg.cache.poll_interval = value.max(1);
        }
        if let Some(value) = env_u64("SOCIALITE_MESSAGE_RETENTION_DAYS") {
            cfg.cache.message_retention_days = if value == 0 { None } else { Some(value) };
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.sync.max_retry == 0 {
            return Err("Sync max_retry must be greater than 0".to_string());
        }
        if self.sync.sync_interval == 0 {
            return Err("Sync sync_interval must be greater than 0".to_string());
        }
        if self.sync.base_backoff_ms > self.sync.max_backoff_ms {
            return Err("Sync base_backoff_ms must not exceed max_backoff_ms".to_string());
        }
        if self.cache.poll_interval == 0 {
            return Err("Cache poll_interval must be greater than 0".to_string());
        }
        if self.cache.feed_page_size == 0 {
            return Err("Cache feed_page_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cache.edit_window(), Duration::from_secs(300));
        assert_eq!(cfg.sync.completed_retention(), Duration::from_secs(2 * 24 * 3600));
    }

    #[test]
    fn validate_rejects_inverted_backoff() {
        let mut cfg = AppConfig::default();
        cfg.sync.base_backoff_ms = 10_000;
        cfg.sync.max_backoff_ms = 1_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_bool_falls_back_on_garbage() {
        assert!(parse_bool("YES", false));
        assert!(!parse_bool("off", true));
        assert!(parse_bool("maybe", true));
    }
}
