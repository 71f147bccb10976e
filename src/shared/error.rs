use std::fmt;

use crate::application::ports::remote_api::RemoteError;

#[derive(Debug)]
pub enum AppError {
    /// ストレージ層の失敗（ディスク容量不足、破損など）。`NotFound` とは区別する。
    Database(String),
    Network(String),
    NotFound(String),
    InvalidInput(String),
    ValidationError(String),
    EditWindowExpired(String),
    ConfigurationError(String),
    SerializationError(String),
    DeserializationError(String),
    Internal(String),
}

impl AppError {
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Database(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::EditWindowExpired(msg) => write!(f, "Edit window expired: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_not_conflated_with_not_found() {
        let storage = AppError::from(sqlx::Error::PoolClosed);
        assert!(storage.is_storage());
        assert!(!AppError::NotFound("message local-1".into()).is_storage());
    }

    #[test]
    fn remote_errors_map_to_network() {
        let err = AppError::from(RemoteError::Offline);
        assert!(matches!(err, AppError::Network(_)));
    }
}
