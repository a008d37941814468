//! Cleaning assessment over the raw, unrefined dataset.

use crate::data::{Cell, RawColumn, RawDataset};
use crate::stats::{quantile, round_to};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabula_core::Brain;
use tracing::{debug, warn};

const MAX_ISSUES_IN_PROMPT: usize = 15;
const SYSTEM_PROMPT: &str = "You are a data quality expert. Give concise, practical cleaning advice. \
Return JSON with key 'recommendations' as a list of strings.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningIssue {
    pub column: String,
    /// missing_values, duplicates, outliers, type_mismatch or formatting.
    pub issue_type: String,
    /// low, medium or high.
    pub severity: String,
    pub description: String,
    pub suggestion: String,
    pub affected_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub dataset_id: String,
    pub total_issues: usize,
    pub quality_score: f64,
    pub issues: Vec<CleaningIssue>,
    pub ai_recommendations: Vec<String>,
}

fn issue(
    column: &str,
    issue_type: &str,
    severity: &str,
    description: String,
    suggestion: String,
    affected_rows: usize,
) -> CleaningIssue {
    CleaningIssue {
        column: column.to_string(),
        issue_type: issue_type.to_string(),
        severity: severity.to_string(),
        description,
        suggestion,
        affected_rows,
    }
}

fn missing_issue(column: &RawColumn, rows: usize) -> Option<CleaningIssue> {
    let missing = column.cells.iter().filter(|c| c.is_null()).count();
    if missing == 0 || rows == 0 {
        return None;
    }
    let pct = missing as f64 / rows as f64 * 100.0;
    let severity = if pct > 30.0 {
        "high"
    } else if pct > 10.0 {
        "medium"
    } else {
        "low"
    };
    Some(issue(
        &column.name,
        "missing_values",
        severity,
        format!("{} missing values ({:.1}%)", missing, pct),
        format!(
            "Fill with median/mode or drop rows if {} is non-critical",
            column.name
        ),
        missing,
    ))
}

fn outlier_issue(column: &RawColumn, rows: usize) -> Option<CleaningIssue> {
    let values: Vec<f64> = column.cells.iter().filter_map(Cell::as_number).collect();
    let q1 = quantile(&values, 0.25);
    let q3 = quantile(&values, 0.75);
    let iqr = q3 - q1;
    if !iqr.is_finite() || iqr == 0.0 {
        return None;
    }
    let (lower, upper) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let outliers = values.iter().filter(|v| **v < lower || **v > upper).count();
    if outliers == 0 {
        return None;
    }
    Some(issue(
        &column.name,
        "outliers",
        if outliers as f64 > rows as f64 * 0.05 { "medium" } else { "low" },
        format!(
            "{} potential outliers (outside IQR bounds: {:.2} to {:.2})",
            outliers, lower, upper
        ),
        "Investigate outliers: clip, winsorize, or remove if erroneous".to_string(),
        outliers,
    ))
}

fn strictly_numeric(cell: &Cell) -> bool {
    match cell {
        Cell::Number(_) => true,
        Cell::Text(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn text_issues(column: &RawColumn) -> Vec<CleaningIssue> {
    let mut found = Vec::new();
    let non_null = column.cells.iter().filter(|c| !c.is_null()).count();
    let numeric = column.cells.iter().filter(|c| strictly_numeric(c)).count();
    if non_null > 0 && numeric * 2 > non_null && numeric != non_null {
        let bad = non_null - numeric;
        found.push(issue(
            &column.name,
            "type_mismatch",
            "medium",
            format!("Column appears numeric but has {} non-numeric values", bad),
            "Convert to numeric, treating unparseable values as missing".to_string(),
            bad,
        ));
    }

    let padded = column
        .cells
        .iter()
        .filter_map(Cell::as_text)
        .filter(|s| s.trim() != *s)
        .count();
    if padded > 0 {
        found.push(issue(
            &column.name,
            "formatting",
            "low",
            format!("{} values have leading/trailing whitespace", padded),
            format!("Strip leading and trailing whitespace from {}", column.name),
            padded,
        ));
    }
    found
}

/// Per-column issues: missing values, duplicates, IQR outliers in numeric
/// columns, numeric-looking text columns, and padded text.
pub fn assess(raw: &RawDataset) -> Vec<CleaningIssue> {
    let rows = raw.n_rows();
    let mut issues: Vec<CleaningIssue> = raw
        .columns()
        .iter()
        .filter_map(|c| missing_issue(c, rows))
        .collect();

    let duplicates = raw.duplicate_rows();
    if duplicates > 0 {
        issues.push(issue(
            "[all]",
            "duplicates",
            if duplicates as f64 > rows as f64 * 0.05 { "medium" } else { "low" },
            format!("{} duplicate rows found", duplicates),
            "Remove duplicate rows".to_string(),
            duplicates,
        ));
    }

    for column in raw.columns() {
        if RawDataset::is_numeric_column(column) {
            issues.extend(outlier_issue(column, rows));
        } else {
            issues.extend(text_issues(column));
        }
    }
    debug!(issues = issues.len(), "Assessed dataset for cleaning");
    issues
}

/// 100 minus affected cells as a percentage of all cells, floored at 0.
pub fn cleaning_score(raw: &RawDataset, issues: &[CleaningIssue]) -> f64 {
    let cells = raw.n_rows() * raw.n_cols();
    if cells == 0 {
        return 100.0;
    }
    let affected: usize = issues.iter().map(|i| i.affected_rows).sum();
    round_to((100.0 - affected as f64 / cells as f64 * 100.0).max(0.0), 1)
}

fn recommendations_prompt(raw: &RawDataset, issues: &[CleaningIssue]) -> String {
    let summary: Vec<String> = issues
        .iter()
        .take(MAX_ISSUES_IN_PROMPT)
        .map(|i| format!("- {}: {} - {}", i.column, i.issue_type, i.description))
        .collect();
    format!(
        "Given this dataset with {} rows and {} columns:\nColumns: {:?}\n\nIssues found:\n{}\n\n\
Provide 3-5 specific, actionable data cleaning recommendations. Focus on practical steps.",
        raw.n_rows(),
        raw.n_cols(),
        raw.column_names(),
        summary.join("\n")
    )
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Assess the dataset and ask the LLM for cleaning advice. LLM failures
/// leave the recommendations empty.
pub async fn cleaning_report(dataset_id: &str, raw: &RawDataset, brain: &Brain) -> CleaningReport {
    let issues = assess(raw);
    let quality_score = cleaning_score(raw, &issues);
    let ai_recommendations = match brain
        .ask_json(SYSTEM_PROMPT, &recommendations_prompt(raw, &issues), 0.3)
        .await
    {
        Ok(value) => string_list(&value, "recommendations"),
        Err(e) => {
            warn!(error = %e, dataset_id, "Cleaning recommendations unavailable");
            Vec::new()
        }
    };
    CleaningReport {
        dataset_id: dataset_id.to_string(),
        total_issues: issues.len(),
        quality_score,
        issues,
        ai_recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_delimited;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tabula_core::MockLlmProvider;

    fn messy() -> RawDataset {
        parse_delimited(
            "id,amount,city,price\n\
1,10,\" Paris\",5\n\
2,12,Rome,n/a\n\
3,11,Rome,7\n\
4,9,Oslo,abc\n\
5,10,Oslo,8\n\
6,11,Oslo,9\n\
6,11,Oslo,9\n\
7,500,Oslo,10\n",
            ',',
        )
        .unwrap()
    }

    fn kinds(issues: &[CleaningIssue]) -> Vec<(&str, &str)> {
        issues
            .iter()
            .map(|i| (i.column.as_str(), i.issue_type.as_str()))
            .collect()
    }

    #[test]
    fn test_assess_finds_each_kind() {
        let issues = assess(&messy());
        let kinds = kinds(&issues);
        assert!(kinds.contains(&("price", "missing_values")));
        assert!(kinds.contains(&("[all]", "duplicates")));
        assert!(kinds.contains(&("amount", "outliers")));
        assert!(kinds.contains(&("price", "type_mismatch")));
        assert!(kinds.contains(&("city", "formatting")));
    }

    #[test]
    fn test_missing_severity() {
        let issues = assess(&messy());
        let missing = issues
            .iter()
            .find(|i| i.issue_type == "missing_values")
            .unwrap();
        assert_eq!(missing.affected_rows, 1);
        assert_eq!(missing.severity, "medium");
        assert_eq!(missing.description, "1 missing values (12.5%)");
    }

    #[test]
    fn test_score_bounds() {
        let clean = parse_delimited("a,b\n1,2\n3,4\n", ',').unwrap();
        assert_eq!(cleaning_score(&clean, &assess(&clean)), 100.0);
        let empty = RawDataset::default();
        assert_eq!(cleaning_score(&empty, &[]), 100.0);
        let score = cleaning_score(&messy(), &assess(&messy()));
        assert!((0.0..100.0).contains(&score));
    }

    #[tokio::test]
    async fn test_report_with_llm() {
        let provider = MockLlmProvider::with_response(
            r#"{"recommendations": ["Drop duplicates", "Trim city names"]}"#,
        );
        let brain = Brain::new(Arc::new(provider));
        let report = cleaning_report("sales", &messy(), &brain).await;
        assert_eq!(report.total_issues, report.issues.len());
        assert_eq!(report.ai_recommendations, vec!["Drop duplicates", "Trim city names"]);
    }

    #[tokio::test]
    async fn test_report_without_llm() {
        let brain = Brain::new(Arc::new(MockLlmProvider::failing()));
        let report = cleaning_report("sales", &messy(), &brain).await;
        assert!(report.ai_recommendations.is_empty());
        assert!(report.total_issues > 0);
    }
}
