//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabula_core::config::workspace_config_path;
use tabula_core::{Brain, TabulaConfig, UnavailableProvider, create_provider};
use tabula_ml::causal::build_causal_network;
use tabula_ml::data::{ColumnKind, RefinedDataset};
use tabula_ml::forecast::ForecastRequest;
use tabula_ml::{
    DatasetSource, DirectorySource, Pipeline, SummaryStats, cleaning_report, compare, refine,
};
use tracing::warn;

/// Effective configuration and dataset location for one invocation.
pub struct Session {
    config: TabulaConfig,
    workspace: PathBuf,
    source: Arc<DirectorySource>,
}

impl Session {
    pub fn new(config: TabulaConfig, workspace: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config,
            workspace,
            source: Arc::new(DirectorySource::new(data_dir)),
        }
    }

    /// A brain for the configured provider. Without a usable provider every
    /// narrative section takes its deterministic fallback.
    fn brain(&self) -> Arc<Brain> {
        let llm = &self.config.llm;
        let provider = create_provider(llm).unwrap_or_else(|e| {
            warn!(error = %e, "LLM provider unavailable; narrative sections will use fallbacks");
            Arc::new(UnavailableProvider::new(llm.model.clone(), e.to_string()))
        });
        Arc::new(
            Brain::new(provider)
                .with_model(llm.model.clone())
                .with_max_tokens(llm.max_tokens),
        )
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::from_config(&self.config, self.brain(), self.source.clone())
    }

    async fn load_refined(&self, dataset: &str) -> anyhow::Result<RefinedDataset> {
        let raw = self.source.load(dataset).await?;
        Ok(refine(&raw))
    }
}

#[derive(Debug, Serialize)]
struct ColumnSummary {
    name: String,
    kind: ColumnKind,
}

#[derive(Debug, Serialize)]
struct RefineSummary {
    dataset_id: String,
    summary: SummaryStats,
    columns: Vec<ColumnSummary>,
    preview: String,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, session: &Session) -> anyhow::Result<()> {
    match command {
        Commands::Dashboard { dataset } => {
            let result = session
                .pipeline()
                .run_source(session.source.as_ref(), &dataset)
                .await?;
            print_json(&result)
        }
        Commands::Refine { dataset } => {
            let ds = session.load_refined(&dataset).await?;
            print_json(&refine_summary(&dataset, &ds))
        }
        Commands::Forecast {
            dataset,
            date_column,
            value_column,
            horizon,
        } => {
            let raw = session.source.load(&dataset).await?;
            let request = ForecastRequest::new(date_column, value_column).with_horizon(horizon);
            let report = session.pipeline().forecast(&dataset, raw, &request).await?;
            print_json(&report)
        }
        Commands::Causal { dataset } => {
            let ds = session.load_refined(&dataset).await?;
            print_json(&build_causal_network(&ds))
        }
        Commands::Clean { dataset } => {
            let raw = session.source.load(&dataset).await?;
            let report = cleaning_report(&dataset, &raw, &session.brain()).await;
            print_json(&report)
        }
        Commands::Compare {
            first,
            second,
            instructions,
        } => {
            let a = session.load_refined(&first).await?;
            let b = session.load_refined(&second).await?;
            let report = compare(
                &[(first.as_str(), &a), (second.as_str(), &b)],
                &session.brain(),
                instructions.as_deref(),
            )
            .await;
            print_json(&report)
        }
        Commands::Config { action } => handle_config(action, &session.workspace),
    }
}

fn refine_summary(dataset: &str, ds: &RefinedDataset) -> RefineSummary {
    RefineSummary {
        dataset_id: dataset.to_string(),
        summary: SummaryStats::of(ds),
        columns: ds
            .columns()
            .iter()
            .map(|c| ColumnSummary {
                name: c.name.clone(),
                kind: c.kind(),
            })
            .collect(),
        preview: ds.preview(5),
    }
}

pub fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = tabula_core::config::write_default_config(workspace)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = tabula_core::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            for warning in config.validate() {
                eprintln!("warning: {}", warning);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn session(dir: &Path) -> Session {
        let mut config = TabulaConfig::default();
        config.llm.api_key_env = "TABULA_TEST_KEY_THAT_IS_NEVER_SET".into();
        Session::new(config, dir.to_path_buf(), dir.to_path_buf())
    }

    fn write_csv(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(format!("{}.csv", name)), body).unwrap();
    }

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Init, dir.path()).unwrap();

        let config_path = dir.path().join(".tabula").join("config.toml");
        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: TabulaConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, TabulaConfig::default());
    }

    #[test]
    fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        let config_path = workspace_config_path(dir.path());
        std::fs::write(&config_path, "[pipeline]\nworkers = 5\n").unwrap();

        handle_config(ConfigAction::Init, dir.path()).unwrap();
        let content = std::fs::read_to_string(&config_path).unwrap();
        assert_eq!(content, "[pipeline]\nworkers = 5\n");
    }

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        assert!(handle_config(ConfigAction::Show, dir.path()).is_ok());
    }

    #[test]
    fn test_refine_summary_kinds() {
        let ds = refine(
            &tabula_ml::data::parse_delimited(
                "order_date,amount,region\n2024-01-02,$10,North\n2024-01-03,$12,South\n",
                ',',
            )
            .unwrap(),
        );
        let summary = refine_summary("orders", &ds);
        let kinds: Vec<ColumnKind> = summary.columns.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ColumnKind::Temporal, ColumnKind::Numeric, ColumnKind::Categorical]
        );
        assert_eq!(summary.summary.total_rows, 2);
    }

    #[tokio::test]
    async fn test_causal_command_runs() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "metrics", "a,b,c\n1,2,9\n2,1,7\n3,5,8\n4,3,2\n5,8,1\n6,5,4\n");
        let command = Commands::Causal {
            dataset: "metrics".into(),
        };
        assert!(handle_command(command, &session(dir.path())).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_dataset_fails() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Refine {
            dataset: "absent".into(),
        };
        assert!(handle_command(command, &session(dir.path())).await.is_err());
    }

    #[tokio::test]
    async fn test_clean_without_llm_key() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "raw", "name,amount\nA,1\nB,\nA,1\n");
        let command = Commands::Clean {
            dataset: "raw".into(),
        };
        assert!(handle_command(command, &session(dir.path())).await.is_ok());
    }
}
