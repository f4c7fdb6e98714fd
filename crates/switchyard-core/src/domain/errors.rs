//! Errors - エラー型と分類
//!
//! 2 系統に分ける:
//! - `SwitchyardError`: レジストリ / スケジューラの配管エラー。呼び出し元へ同期的に返す。
//! - `UseCaseError`: UseCase 内部の失敗。必ず Callback::on_failure 経由で届く。

use thiserror::Error;

use super::ids::ChannelId;

/// Plumbing errors, returned directly to the caller.
#[derive(Debug, Error)]
pub enum SwitchyardError {
    #[error("channel does not exist: {0}")]
    ChannelNotFound(ChannelId),

    #[error("scheduler saturated: {workers} workers busy, {queued} submissions queued")]
    Saturated { workers: usize, queued: usize },

    #[error("scheduler pool is shutting down")]
    ShuttingDown,

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("invalid pool config: {0}")]
    InvalidConfig(String),
}

/// Failure reported by (or on behalf of) a use case.
#[derive(Debug, Error)]
pub enum UseCaseError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("use case `{task}` panicked: {message}")]
    Panicked { task: &'static str, message: String },

    #[error("use case `{0}` finished without reporting an outcome")]
    Abandoned(&'static str),

    #[error("use case `{0}` was cancelled before it started")]
    Cancelled(&'static str),
}

impl UseCaseError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// True for failures produced by the scheduler rather than the use case itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Panicked { .. } | Self::Abandoned(_) | Self::Cancelled(_)
        )
    }
}

impl From<String> for UseCaseError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for UseCaseError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_channel() {
        let err = SwitchyardError::ChannelNotFound(ChannelId::new(9));
        assert_eq!(err.to_string(), "channel does not exist: 9");
    }

    #[test]
    fn source_errors_keep_their_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such user");
        let err = UseCaseError::from(Box::new(io) as Box<dyn std::error::Error + Send + Sync>);
        assert_eq!(err.to_string(), "no such user");
        assert!(!err.is_infrastructure());
    }

    #[test]
    fn scheduler_generated_failures_are_infrastructure() {
        assert!(UseCaseError::Cancelled("t").is_infrastructure());
        assert!(UseCaseError::Abandoned("t").is_infrastructure());
        assert!(!UseCaseError::failed("boom").is_infrastructure());
    }
}
