//! # Tabula Core
//!
//! Shared plumbing for the Tabula analytics pipeline: layered configuration,
//! the LLM completion contract (brain) with an OpenAI-compatible provider,
//! the remote compute offload client, and the error taxonomy.

pub mod brain;
pub mod config;
pub mod error;
pub mod offload;
pub mod providers;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider, parse_json_object};
pub use config::{
    AnalysisConfig, LlmConfig, OffloadConfig, PipelineConfig, TabulaConfig, config_exists,
    load_config,
};
pub use error::{ConfigError, LlmError, OffloadError, Result, TabulaError};
pub use offload::{OffloadClient, RemoteCompute};
pub use providers::{UnavailableProvider, create_provider};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
