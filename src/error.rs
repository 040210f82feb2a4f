use thiserror::Error;

use crate::engine::JobFailure;

/// A submission rejected before any job entered the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no items submitted")]
    EmptyBatch,

    #[error("item {index} is empty")]
    EmptyItem { index: usize },

    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,
}

/// Failures visible above the per-item level.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid submission: {0}")]
    Validation(#[from] ValidationError),

    #[error("all {total} jobs failed")]
    AllFailed {
        total: usize,
        failures: Vec<JobFailure>,
    },

    #[error("a batch is already running")]
    AlreadyRunning,

    #[error("cannot reset while a batch is running")]
    StillRunning,

    #[error("batch worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Errors raised by a single `generate` call. Recorded per job, never propagated.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("content blocked: {0}")]
    ContentBlocked(String),

    #[error("malformed output: {0}")]
    MalformedOutput(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("history lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("archive unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid payload for {name}: {reason}")]
    InvalidPayload { name: String, reason: String },

    #[error("fallback emitted {emitted} of {total} items: {source}")]
    Fallback {
        emitted: usize,
        total: usize,
        #[source]
        source: Box<ExportError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        assert_eq!(ValidationError::EmptyBatch.to_string(), "no items submitted");
        assert_eq!(
            ValidationError::EmptyItem { index: 2 }.to_string(),
            "item 2 is empty"
        );
    }

    #[test]
    fn all_failed_display() {
        let err = EngineError::AllFailed {
            total: 4,
            failures: Vec::new(),
        };
        assert_eq!(err.to_string(), "all 4 jobs failed");
    }

    #[test]
    fn validation_converts_into_engine_error() {
        let err: EngineError = ValidationError::ZeroConcurrency.into();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::ZeroConcurrency)
        ));
    }

    #[test]
    fn generate_error_display() {
        let err = GenerateError::Api {
            status: 500,
            message: "upstream exploded".into(),
        };
        assert_eq!(err.to_string(), "API error (status 500): upstream exploded");
        assert_eq!(GenerateError::Other("boom".into()).to_string(), "boom");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
        assert_send_sync::<GenerateError>();
        assert_send_sync::<ExportError>();
    }
}
