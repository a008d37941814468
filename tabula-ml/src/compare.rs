//! Side-by-side comparison of two or more datasets.

use crate::data::RefinedDataset;
use crate::stats::{mean, round_to};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tabula_core::Brain;
use tracing::warn;

const SYSTEM_PROMPT: &str = "You are a senior data analyst. Provide comparative intelligence \
comparing shifts in metrics and business strategies. Return valid JSON only.";
const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub dataset_ids: Vec<String>,
    /// Percent change of each shared numeric column mean, first dataset to second.
    pub metrics_delta: BTreeMap<String, f64>,
    pub summary: String,
    pub similarities: Vec<String>,
    pub differences: Vec<String>,
    pub strategy: String,
}

/// Mean of every numeric column.
pub fn column_means(ds: &RefinedDataset) -> BTreeMap<String, f64> {
    ds.numeric_columns()
        .into_iter()
        .map(|(name, values)| (name.to_string(), mean(values)))
        .filter(|(_, m)| m.is_finite())
        .collect()
}

/// Percent deltas for columns present in both, skipping a zero baseline.
pub fn metrics_delta(
    first: &BTreeMap<String, f64>,
    second: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    first
        .iter()
        .filter_map(|(name, &v1)| {
            let v2 = *second.get(name)?;
            (v1 != 0.0).then(|| (name.clone(), round_to((v2 - v1) / v1 * 100.0, 2)))
        })
        .collect()
}

fn prompt(
    datasets: &[(&str, &RefinedDataset)],
    means: &[BTreeMap<String, f64>],
    delta: &BTreeMap<String, f64>,
    instructions: Option<&str>,
) -> String {
    let mut sections = String::new();
    for ((id, ds), stats) in datasets.iter().zip(means) {
        let short: String = id.chars().take(8).collect();
        sections.push_str(&format!(
            "\n--- Dataset {} ---\nStats: {:?}\nPreview:\n{}\n",
            short,
            stats,
            ds.preview(PREVIEW_ROWS)
        ));
    }
    let extra = instructions
        .map(|i| format!("\nAdditional instructions: {}\n", i))
        .unwrap_or_default();
    format!(
        "Compare the {} datasets quantitatively and qualitatively.\n\
Metrics deltas (dataset 1 to dataset 2): {:?}\n{}{}\n\
Return JSON:\n{{\"comparison_summary\": \"...\", \"similarities\": [\"...\"], \
\"differences\": [\"...\"], \"comparative_strategy\": \"...\"}}",
        datasets.len(),
        delta,
        extra,
        sections
    )
}

fn text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn texts(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Compare datasets. Deltas are computed locally; the narrative comes from
/// the LLM and is left empty when it fails.
pub async fn compare(
    datasets: &[(&str, &RefinedDataset)],
    brain: &Brain,
    instructions: Option<&str>,
) -> ComparisonReport {
    let means: Vec<BTreeMap<String, f64>> = datasets.iter().map(|(_, ds)| column_means(ds)).collect();
    let delta = match means.as_slice() {
        [first, second, ..] => metrics_delta(first, second),
        _ => BTreeMap::new(),
    };

    let mut report = ComparisonReport {
        dataset_ids: datasets.iter().map(|(id, _)| id.to_string()).collect(),
        metrics_delta: delta,
        ..ComparisonReport::default()
    };
    let user = prompt(datasets, &means, &report.metrics_delta, instructions);
    match brain.ask_json(SYSTEM_PROMPT, &user, 0.3).await {
        Ok(value) => {
            report.summary = text(&value, "comparison_summary");
            report.similarities = texts(&value, "similarities");
            report.differences = texts(&value, "differences");
            report.strategy = text(&value, "comparative_strategy");
        }
        Err(e) => warn!(error = %e, "Comparison narrative unavailable"),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tabula_core::MockLlmProvider;

    fn pair() -> (RefinedDataset, RefinedDataset) {
        (
            RefinedDataset::from_numeric(vec![
                ("revenue", vec![100.0, 300.0]),
                ("cost", vec![0.0, 0.0]),
                ("only_a", vec![1.0, 1.0]),
            ])
            .unwrap(),
            RefinedDataset::from_numeric(vec![
                ("revenue", vec![250.0, 250.0]),
                ("cost", vec![5.0, 5.0]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_metrics_delta() {
        let (a, b) = pair();
        let delta = metrics_delta(&column_means(&a), &column_means(&b));
        assert_eq!(delta.len(), 1);
        assert_eq!(delta["revenue"], 25.0);
    }

    #[tokio::test]
    async fn test_compare_with_narrative() {
        let (a, b) = pair();
        let provider = MockLlmProvider::with_response(
            r#"{"comparison_summary": "Revenue grew", "similarities": ["Same columns"],
                "differences": ["Cost appeared"], "comparative_strategy": "Watch cost"}"#,
        );
        let brain = Brain::new(Arc::new(provider));
        let report = compare(&[("q1", &a), ("q2", &b)], &brain, Some("focus on revenue")).await;
        assert_eq!(report.dataset_ids, vec!["q1", "q2"]);
        assert_eq!(report.summary, "Revenue grew");
        assert_eq!(report.differences, vec!["Cost appeared"]);
        assert_eq!(report.strategy, "Watch cost");
    }

    #[tokio::test]
    async fn test_compare_llm_failure_keeps_deltas() {
        let (a, b) = pair();
        let brain = Brain::new(Arc::new(MockLlmProvider::failing()));
        let report = compare(&[("q1", &a), ("q2", &b)], &brain, None).await;
        assert_eq!(report.metrics_delta["revenue"], 25.0);
        assert!(report.summary.is_empty());
    }
}
