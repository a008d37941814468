//! Error types for the Tabula core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the LLM, remote offload, and configuration domains.

use std::path::PathBuf;

/// Top-level error type for the Tabula core library.
#[derive(Debug, thiserror::Error)]
pub enum TabulaError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Offload error: {0}")]
    Offload(#[from] OffloadError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Provider returned an empty completion")]
    EmptyCompletion,
}

/// Errors from the remote compute offload platform.
#[derive(Debug, thiserror::Error)]
pub enum OffloadError {
    #[error("Remote offload is disabled")]
    Disabled,

    #[error("Offload request failed: {message}")]
    Request { message: String },

    #[error("Remote function '{function}' failed with status {status}: {message}")]
    Remote {
        function: String,
        status: u16,
        message: String,
    },

    #[error("Could not decode remote result: {message}")]
    Decode { message: String },

    #[error("Offload call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `TabulaError`.
pub type Result<T> = std::result::Result<T, TabulaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = TabulaError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_offload() {
        let err = TabulaError::Offload(OffloadError::Remote {
            function: "run_forecast".into(),
            status: 502,
            message: "bad gateway".into(),
        });
        assert_eq!(
            err.to_string(),
            "Offload error: Remote function 'run_forecast' failed with status 502: bad gateway"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = TabulaError::Config(ConfigError::EnvVarMissing {
            var: "OPENAI_API_KEY".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Environment variable not set: OPENAI_API_KEY"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TabulaError = io_err.into();
        assert!(matches!(err, TabulaError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: TabulaError = serde_err.into();
        assert!(matches!(err, TabulaError::Serialization(_)));
    }

    #[test]
    fn test_llm_error_variants() {
        let err = LlmError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited by provider, retry after 60s");
        assert_eq!(
            LlmError::EmptyCompletion.to_string(),
            "Provider returned an empty completion"
        );
    }
}
