use std::time::Duration;

use spool_core::errors::GatewayError;
use spool_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("summarization failed: {0}")]
    SummarizationFailed(#[from] GatewayError),

    #[error("summarization timed out after {0:?}")]
    SummarizationTimeout(Duration),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Short classification string for wire error codes and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::SummarizationFailed(_) => "summarization_failed",
            Self::SummarizationTimeout(_) => "summarization_timeout",
            Self::Store(StoreError::NotFound(_)) => "not_found",
            Self::Store(StoreError::Conflict(_)) => "conflict",
            Self::Store(_) => "store_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings() {
        assert_eq!(EngineError::Validation("bad".into()).kind(), "validation_error");
        assert_eq!(
            EngineError::SummarizationTimeout(Duration::from_secs(30)).kind(),
            "summarization_timeout"
        );
        assert_eq!(
            EngineError::Store(StoreError::NotFound("thread x".into())).kind(),
            "not_found"
        );
        assert_eq!(
            EngineError::Store(StoreError::Database("locked".into())).kind(),
            "store_error"
        );
    }

    #[test]
    fn gateway_errors_convert() {
        let err: EngineError = GatewayError::GatewayOverloaded.into();
        assert_eq!(err.kind(), "summarization_failed");
    }
}
