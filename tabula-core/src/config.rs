//! Configuration system for Tabula.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/tabula/config.toml` and/or `.tabula/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabulaConfig {
    pub llm: LlmConfig,
    pub offload: OffloadConfig,
    pub analysis: AnalysisConfig,
    pub pipeline: PipelineConfig,
}

impl TabulaConfig {
    /// Collect validation warnings from every section.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        warnings.extend(self.offload.validate());
        warnings.extend(self.pipeline.validate());
        warnings
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai" or any OpenAI-compatible endpoint.
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Inline API key. Prefer `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 2048,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.model.trim().is_empty() {
            warnings.push("llm.model is empty; requests will use the provider default".into());
        }
        if self.timeout_secs == 0 {
            warnings.push("llm.timeout_secs is 0; requests may never complete".into());
        }
        if let Some(url) = &self.base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            warnings.push(format!("llm.base_url '{}' is not an http(s) URL", url));
        }
        warnings
    }
}

/// Remote compute offload configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffloadConfig {
    /// Whether stages try the remote platform before computing locally.
    pub enabled: bool,
    /// Base URL of the offload platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Application name the remote functions are deployed under.
    pub app_name: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    /// Timeout for a single remote call, in seconds.
    pub timeout_secs: u64,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            app_name: "tabula-analysis".to_string(),
            token_env: "TABULA_OFFLOAD_TOKEN".to_string(),
            timeout_secs: 120,
        }
    }
}

impl OffloadConfig {
    /// Whether the configuration is complete enough to build a client.
    pub fn is_active(&self) -> bool {
        self.enabled && self.base_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.enabled && self.base_url.is_none() {
            warnings.push(
                "offload.enabled is true but offload.base_url is unset; stages run locally".into(),
            );
        }
        warnings
    }
}

/// Analyzer tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Trees in the feature-importance forest.
    pub forest_trees: usize,
    /// Seed for every randomized model.
    pub random_seed: u64,
    /// Months predicted by the dashboard forecast.
    pub forecast_horizon: usize,
    /// Requested decomposition period before downgrading.
    pub decomposition_period: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            forest_trees: 50,
            random_seed: 42,
            forecast_horizon: 3,
            decomposition_period: 12,
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Size of the stage worker pool. Clamped to 3..=5.
    pub workers: usize,
    /// Token limit for each persona analysis.
    pub persona_max_tokens: usize,
    /// Response language appended to narrative prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            persona_max_tokens: 800,
            language: None,
        }
    }
}

impl PipelineConfig {
    pub const MIN_WORKERS: usize = 3;
    pub const MAX_WORKERS: usize = 5;

    /// Effective pool size.
    pub fn worker_count(&self) -> usize {
        self.workers.clamp(Self::MIN_WORKERS, Self::MAX_WORKERS)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.workers != self.worker_count() {
            warnings.push(format!(
                "pipeline.workers = {} is outside {}..={}; using {}",
                self.workers,
                Self::MIN_WORKERS,
                Self::MAX_WORKERS,
                self.worker_count()
            ));
        }
        warnings
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "tabula", "tabula")
}

/// Path of the user-level config file, if a home directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".tabula").join("config.toml")
}

/// Directory for rolling log files.
pub fn log_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load configuration with layered precedence:
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `TABULA_`)
/// 3. Workspace-local config (`.tabula/config.toml`)
/// 4. User config (`~/.config/tabula/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&TabulaConfig>,
) -> Result<TabulaConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(TabulaConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (TABULA_LLM__MODEL, TABULA_OFFLOAD__ENABLED, etc.)
    figment = figment.merge(Env::prefixed("TABULA_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether any Tabula configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

/// Write the default configuration to `<workspace>/.tabula/config.toml`.
///
/// Refuses to overwrite an existing file. Returns the path written.
pub fn write_default_config(workspace: &Path) -> Result<PathBuf, ConfigError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("{} already exists", path.display()),
        });
    }
    let body =
        toml::to_string_pretty(&TabulaConfig::default()).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid {
            message: format!("cannot create {}: {}", parent.display(), e),
        })?;
    }
    std::fs::write(&path, body).map_err(|e| ConfigError::Invalid {
        message: format!("cannot write {}: {}", path.display(), e),
    })?;
    Ok(path)
}
