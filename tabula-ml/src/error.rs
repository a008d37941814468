//! Error types for the tabula-ml crate.

use tabula_core::error::{LlmError, OffloadError};
use thiserror::Error;

/// Top-level error type for analytics operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Forecast error: {0}")]
    Forecast(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Offload error: {0}")]
    Offload(#[from] OffloadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn forecast(msg: impl Into<String>) -> Self {
        Self::Forecast(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            MlError::forecast("No valid data points found after cleaning").to_string(),
            "Forecast error: No valid data points found after cleaning"
        );
        let err: MlError = OffloadError::Disabled.into();
        assert_eq!(err.to_string(), "Offload error: Remote offload is disabled");
    }
}
