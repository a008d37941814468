//! End-to-end dashboard scenarios over CSV files on disk.

use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tabula_core::{Brain, MockLlmProvider, TabulaConfig};
use tabula_ml::data::{Cell, RawColumn, RawDataset, parse_delimited, refine};
use tabula_ml::forecast::{ForecastRequest, Forecaster};
use tabula_ml::stats::detect_anomalies;
use tabula_ml::data::InMemorySource;
use tabula_ml::{DatasetSource, DirectorySource, Pipeline};
use tempfile::TempDir;

fn failing_brain() -> Arc<Brain> {
    Arc::new(Brain::new(Arc::new(MockLlmProvider::failing())))
}

fn sales_csv() -> String {
    let mut body = String::from("Date,Revenue,Cost,Units,Region\n");
    for i in 0..30 {
        body.push_str(&format!(
            "{}-{:02}-15,\"${},{:03}\",{},{},{}\n",
            2022 + i / 12,
            i % 12 + 1,
            10 + i % 4,
            (i * 137) % 1000,
            6000 + (i % 3) * 150,
            (i * 7) % 11 + 1,
            ["North", "South", "East"][i % 3],
        ));
    }
    body
}

fn write_sales_csv(dir: &Path) {
    std::fs::write(dir.join("sales.csv"), sales_csv()).unwrap();
}

fn config(offload: bool) -> TabulaConfig {
    let mut config = TabulaConfig::default();
    if offload {
        config.offload.enabled = true;
        config.offload.base_url = Some("http://127.0.0.1:9".to_string());
        config.offload.timeout_secs = 5;
    }
    config
}

#[tokio::test]
async fn unreachable_offload_matches_local_run() {
    let dir = TempDir::new().unwrap();
    write_sales_csv(dir.path());
    let source: Arc<dyn DatasetSource> = Arc::new(DirectorySource::new(dir.path()));

    let local = Pipeline::from_config(&config(false), failing_brain(), source.clone());
    let offloaded = Pipeline::from_config(&config(true), failing_brain(), source.clone());

    let expected = local.run_source(source.as_ref(), "sales").await.unwrap();
    let actual = offloaded.run_source(source.as_ref(), "sales").await.unwrap();

    assert_eq!(actual.correlations, expected.correlations);
    assert_eq!(actual.anomalies, expected.anomalies);
    assert_eq!(actual.data_quality, expected.data_quality);
    assert_eq!(actual.feature_importance, expected.feature_importance);
    assert_eq!(actual.causal, expected.causal);
    assert_eq!(actual.segments, expected.segments);
    assert_eq!(actual.forecast, expected.forecast);
    assert_eq!(actual.time_series_decomposition, expected.time_series_decomposition);
    assert_eq!(actual.profit_loss, expected.profit_loss);
    assert_eq!(actual.personas, expected.personas);
    assert!(expected.forecast.is_some());
}

#[tokio::test]
async fn missing_dataset_is_an_error() {
    let dir = TempDir::new().unwrap();
    let source = DirectorySource::new(dir.path());
    let pipeline = Pipeline::from_config(&config(false), failing_brain(), Arc::new(source.clone()));
    assert!(pipeline.run_source(&source, "nope").await.is_err());
}

#[tokio::test]
async fn profit_and_loss_sums_every_dated_row() {
    let raw = parse_delimited(
        "Date,Revenue,Cost\n\
         2024-01-31,\"$2,500\",1500\n\
         2024-02-29,2500,\"$1,500\"\n\
         2024-03-31,2500,1500\n\
         2024-04-30,2500,1500\n",
        ',',
    )
    .unwrap();
    let source: Arc<dyn DatasetSource> =
        Arc::new(InMemorySource::new().with_dataset("ledger", raw.clone()));
    let pipeline = Pipeline::from_config(&config(false), failing_brain(), source);

    let result = pipeline.run("ledger", raw).await.unwrap();

    let pl = result.profit_loss.expect("profit and loss block");
    assert_eq!(pl.total_revenue, 10000.0);
    assert_eq!(pl.total_cost, 6000.0);
    assert_eq!(pl.net_profit, 4000.0);
    assert_eq!(pl.margin_percentage, 40.0);
    assert_eq!(result.summary_stats.total_rows, 4);
    assert_eq!(result.summary_stats.numeric_columns, vec!["Revenue", "Cost"]);
    assert_eq!(result.summary_stats.temporal_columns, vec!["Date"]);
}

#[test]
fn single_spike_is_flagged_high() {
    let values: Vec<Cell> = (0..100)
        .map(|i| {
            if i == 10 {
                Cell::Number(5000.0)
            } else {
                Cell::Number(450.0 + ((i * 37) % 101) as f64)
            }
        })
        .collect();
    let raw = RawDataset::from_columns(vec![RawColumn::new("amount", values)]).unwrap();
    let alerts = detect_anomalies(&refine(&raw));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].row_index, 10);
    assert_eq!(alerts[0].value, 5000.0);
    assert_eq!(alerts[0].severity, "High");
}

#[tokio::test]
async fn tiny_dataset_has_no_segments() {
    let raw = parse_delimited("spend,visits\n1,2\n3,4\n5,6\n7,8\n", ',').unwrap();
    let pipeline = Pipeline::from_config(
        &config(false),
        failing_brain(),
        Arc::new(DirectorySource::new(".")),
    );
    let result = pipeline.run("tiny", raw).await.unwrap();
    assert!(result.segments.is_empty());
    assert_eq!(result.summary_stats.total_rows, 4);
}

#[test]
fn three_months_have_no_decomposition() {
    let raw = parse_delimited(
        "date,sales\n2024-01-05,10\n2024-01-20,12\n2024-02-11,14\n2024-03-02,9\n",
        ',',
    )
    .unwrap();
    let ds = refine(&raw);
    let mut forecaster = Forecaster::new();
    assert_eq!(forecaster.load(&ds, "date", "sales").unwrap().len(), 3);
    forecaster.train().unwrap();
    assert!(forecaster.decompose(12).unwrap().is_none());
    assert_eq!(forecaster.predict_next(2).unwrap().len(), 2);
}

#[test]
fn standalone_forecast_runs_to_completion() {
    let raw = parse_delimited(&sales_csv(), ',').unwrap();
    let pipeline = Pipeline::from_config(
        &config(false),
        failing_brain(),
        Arc::new(DirectorySource::new(".")),
    );
    let request = ForecastRequest::new("Date", "Revenue").with_horizon(4);
    let report = tokio_test::block_on(pipeline.forecast("sales", raw, &request)).unwrap();
    assert_eq!(report.forecast.len(), 4);
    assert_eq!(report.forecast[0].date, "2024-07-31");
    assert_eq!(report.metrics.model, "Holt-Winters Additive");
}
