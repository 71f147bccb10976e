use crate::shared::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ConnectionPool {
    pool: Arc<SqlitePool>,
}

impl ConnectionPool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        Self::connect(
            &config.url,
            config.max_connections,
            Duration::from_secs(config.connection_timeout),
        )
        .await
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let in_memory = is_memory_url(database_url);
        let mut options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
                }
            }
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));
        }

        // インメモリ DB は接続ごとに別物になるため 1 本に固定する
        let max_connections = if in_memory { 1 } else { max_connections.max(1) };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn from_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:", 1, Duration::from_secs(5)).await
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_pool_runs_migrations() {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('messages', 'posts', 'stories', 'pending_actions') ORDER BY name",
        )
        .fetch_all(pool.get_pool())
        .await
        .unwrap();

        let names: Vec<_> = tables.into_iter().map(|(name,)| name).collect();
        assert_eq!(names, vec!["messages", "pending_actions", "posts", "stories"]);
    }

    #[tokio::test]
    async fn file_pool_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let url = format!("sqlite://{}", path.display());

        let pool = ConnectionPool::connect(&url, 2, Duration::from_secs(5))
            .await
            .unwrap();
        pool.migrate().await.unwrap();
        pool.close().await;

        assert!(path.exists());
    }

    #[test]
    fn memory_urls_are_detected() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite://file?mode=memory&cache=shared"));
        assert!(!is_memory_url("sqlite://data/socialite.db"));
    }
}
