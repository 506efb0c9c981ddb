use thiserror::Error;

/// Validation and contract errors exposed by `repuestos-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("piece is required")]
    MissingPiece,
    #[error("model is required")]
    MissingModel,
    #[error("field '{field}' length {len} exceeds max {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("field '{field}' contains control characters")]
    ControlCharacter { field: &'static str },

    #[error("invalid category '{value}'")]
    InvalidCategory { value: String },
    #[error("invalid source '{value}', expected one of marketplace, classifieds, generative, synthetic")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("retry policy must allow at least one attempt")]
    NoAttempts,
    #[error("backoff delays must strictly increase between attempts")]
    NonIncreasingBackoff,
    #[error("total backoff {total_ms}ms exceeds bound {bound_ms}ms")]
    UnboundedBackoff { total_ms: u128, bound_ms: u128 },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] repuestos_store::StoreError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
