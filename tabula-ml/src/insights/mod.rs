//! LLM narrative over the numeric results: three personas and a synthesis.

pub mod personas;
pub mod synthesis;

pub use personas::{ANALYSIS_UNAVAILABLE, PERSONAS, Persona, PersonaReport, run_personas};
pub use synthesis::{ChartSuggestion, GrowthSuggestion, Synthesis, synthesize};

use crate::data::RefinedDataset;
use crate::finance::ProfitLoss;
use crate::stats::{AnomalyAlert, CorrelationMetric, mean};
use std::fmt::Write;

const SAMPLE_ROWS: usize = 5;

const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("ar", "Arabic"),
    ("da", "Danish"),
    ("de", "German"),
    ("en", "English"),
    ("es", "Spanish"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("hi", "Hindi"),
    ("id", "Indonesian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("sv", "Swedish"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("vi", "Vietnamese"),
    ("zh", "Chinese"),
];

/// Display name for a language code; unknown codes pass through uppercased.
pub fn language_name(code: &str) -> String {
    let lower = code.to_lowercase();
    let base = lower.split(['-', '_']).next().unwrap_or_default();
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| *c == base)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.to_uppercase())
}

/// Sentence appended to narrative prompts. Empty for English or no language.
pub fn language_instruction(language: Option<&str>) -> String {
    match language.map(str::trim).filter(|l| !l.is_empty()) {
        None => String::new(),
        Some(code) if language_name(code) == "English" => String::new(),
        Some(code) => format!("\n\nRespond in {}.", language_name(code)),
    }
}

/// Columns, types, sample rows and per-column statistics as prompt text.
pub fn describe_dataset(ds: &RefinedDataset) -> String {
    let mut out = String::from("This is structured tabular data:\n- Columns and types:\n");
    for column in ds.columns() {
        let _ = writeln!(out, "  {} ({})", column.name, column.kind());
    }
    let _ = writeln!(out, "- Sample rows:\n{}", ds.preview(SAMPLE_ROWS));
    out.push_str("- Statistics:\n");
    for (name, values) in ds.numeric_columns() {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let _ = writeln!(
            out,
            "  {}: count={} mean={:.2} min={:.2} max={:.2}",
            name,
            values.len(),
            mean(values),
            min,
            max
        );
    }
    out
}

/// Full persona input: dataset description plus financial and statistical findings.
pub fn analysis_context(
    data_info: &str,
    profit_loss: Option<&ProfitLoss>,
    correlations: &[CorrelationMetric],
    anomalies: &[AnomalyAlert],
) -> String {
    let mut out = data_info.to_string();
    if let Some(pl) = profit_loss {
        let _ = write!(
            out,
            "\nFinancial Stats: Revenue={}, Cost={}, Profit={}, Margin={}%",
            pl.total_revenue, pl.total_cost, pl.net_profit, pl.margin_percentage
        );
    }
    if !correlations.is_empty() {
        out.push_str("\nKey Correlations:\n");
        for c in correlations {
            let _ = writeln!(
                out,
                "- {} and {}: {} ({})",
                c.column_a, c.column_b, c.coefficient, c.description
            );
        }
    }
    if !anomalies.is_empty() {
        out.push_str("\nData Anomalies Detected:\n");
        for a in anomalies {
            let _ = writeln!(
                out,
                "- {} at row {}: {} ({})",
                a.column, a.row_index, a.value, a.reason
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_language_instruction() {
        assert_eq!(language_instruction(None), "");
        assert_eq!(language_instruction(Some("en")), "");
        assert_eq!(language_instruction(Some("  ")), "");
        assert_eq!(language_instruction(Some("fr")), "\n\nRespond in French.");
        assert_eq!(language_instruction(Some("zh-cn")), "\n\nRespond in Chinese.");
        assert_eq!(language_name("xx"), "XX");
    }

    #[test]
    fn test_context_sections() {
        let ds = RefinedDataset::from_numeric(vec![("revenue", vec![1.0, 3.0])]).unwrap();
        let info = describe_dataset(&ds);
        assert!(info.contains("revenue (numeric)"));
        assert!(info.contains("mean=2.00"));

        let pl = ProfitLoss {
            total_revenue: 10.0,
            total_cost: 4.0,
            net_profit: 6.0,
            margin_percentage: 60.0,
        };
        let context = analysis_context(&info, Some(&pl), &[], &[]);
        assert!(context.contains("Margin=60%"));
        assert!(!context.contains("Key Correlations"));
    }
}
