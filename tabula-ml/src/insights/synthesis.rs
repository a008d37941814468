//! Executive synthesis: persona reports in, charts and growth suggestions out.

use super::language_instruction;
use super::personas::PersonaReport;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabula_core::Brain;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are the Executive Synthesizer AI. Return valid JSON only.";
const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSuggestion {
    pub chart_type: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<String>,
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthSuggestion {
    pub title: String,
    pub description: String,
    pub impact: String,
    pub feasibility: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub charts: Vec<ChartSuggestion>,
    pub growth_suggestions: Vec<GrowthSuggestion>,
}

fn field(obj: &Value, key: &str, default: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

fn optional(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn objects<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|v| v.is_object())
}

/// Read charts and suggestions, defaulting missing fields and skipping
/// entries that are not objects.
pub fn parse_synthesis(value: &Value) -> Synthesis {
    let charts = objects(value, "charts")
        .map(|c| ChartSuggestion {
            chart_type: field(c, "chart_type", "bar"),
            title: field(c, "title", "Data Visualization"),
            description: field(c, "description", ""),
            x_axis: optional(c, "x_axis"),
            y_axis: optional(c, "y_axis"),
            data: c
                .get("data")
                .and_then(Value::as_array)
                .map(|d| d.iter().filter(|v| v.is_object()).cloned().collect())
                .unwrap_or_default(),
        })
        .collect();
    let growth_suggestions = objects(value, "growth_suggestions")
        .map(|s| GrowthSuggestion {
            title: field(s, "title", "Strategic Recommendation"),
            description: field(s, "description", ""),
            impact: field(s, "impact", "Medium"),
            feasibility: field(s, "feasibility", "Medium"),
        })
        .collect();
    Synthesis {
        charts,
        growth_suggestions,
    }
}

fn analysis_of<'a>(reports: &'a [PersonaReport], key: &str) -> &'a str {
    reports
        .iter()
        .find(|r| r.persona == key)
        .map(|r| r.analysis.as_str())
        .unwrap_or("None")
}

fn prompt(reports: &[PersonaReport], data_info: &str, language: Option<&str>) -> String {
    format!(
        r#"You have received reports from your CFO, Risk Assessor, and CMO personas.
Review their findings and synthesize them into exactly 3-4 rigorous, data-driven "Growth Suggestions".

CFO Analysis:
{}

Risk Analysis:
{}

CMO Analysis:
{}

Data Context for Charts:
{}

Return JSON strictly matching this format:
{{
    "charts": [
        {{
            "chart_type": "bar|line|pie|scatter|area",
            "title": "Chart title",
            "description": "What this shows.",
            "x_axis": "label or null",
            "y_axis": "label or null",
            "data": [{{"label": "x", "value": 1}}]
        }}
    ],
    "growth_suggestions": [
        {{
            "title": "Synthesized Strategic Recommendation",
            "description": "Detailed explanation incorporating the persona findings",
            "impact": "High/Medium/Low",
            "feasibility": "High/Medium/Low"
        }}
    ]
}}{}"#,
        analysis_of(reports, "CFO"),
        analysis_of(reports, "Risk"),
        analysis_of(reports, "CMO"),
        data_info,
        language_instruction(language)
    )
}

/// One JSON-mode call turning persona reports into charts and suggestions.
/// Empty on failure.
pub async fn synthesize(
    brain: &Brain,
    reports: &[PersonaReport],
    data_info: &str,
    language: Option<&str>,
) -> Synthesis {
    match brain
        .ask_json(SYSTEM_PROMPT, &prompt(reports, data_info, language), TEMPERATURE)
        .await
    {
        Ok(value) => {
            let synthesis = parse_synthesis(&value);
            debug!(
                charts = synthesis.charts.len(),
                suggestions = synthesis.growth_suggestions.len(),
                "Synthesis complete"
            );
            synthesis
        }
        Err(e) => {
            warn!(error = %e, "Dashboard synthesis failed");
            Synthesis::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use tabula_core::MockLlmProvider;

    #[test]
    fn test_defaults_for_missing_fields() {
        let parsed = parse_synthesis(&json!({
            "charts": [{"description": "d", "data": [{"label": "a", "value": 1}, 3]}, "junk"],
            "growth_suggestions": [{}, {"title": "Cut costs", "impact": "High"}]
        }));
        assert_eq!(parsed.charts.len(), 1);
        assert_eq!(parsed.charts[0].chart_type, "bar");
        assert_eq!(parsed.charts[0].title, "Data Visualization");
        assert_eq!(parsed.charts[0].x_axis, None);
        assert_eq!(parsed.charts[0].data.len(), 1);
        assert_eq!(parsed.growth_suggestions[0].title, "Strategic Recommendation");
        assert_eq!(parsed.growth_suggestions[0].feasibility, "Medium");
        assert_eq!(parsed.growth_suggestions[1].impact, "High");
    }

    #[test]
    fn test_non_list_sections() {
        let parsed = parse_synthesis(&json!({"charts": "none", "growth_suggestions": 4}));
        assert_eq!(parsed, Synthesis::default());
    }

    #[tokio::test]
    async fn test_synthesize_uses_json_mode() {
        let provider = Arc::new(MockLlmProvider::with_response(
            r#"{"charts": [{"chart_type": "line", "title": "Revenue"}], "growth_suggestions": []}"#,
        ));
        let brain = Brain::new(provider.clone());
        let reports = vec![PersonaReport {
            persona: "CFO".into(),
            role: "CFO Persona (Finance & Cost Optimization)".into(),
            analysis: "Margins are thin".into(),
        }];
        let synthesis = synthesize(&brain, &reports, "data", None).await;
        assert_eq!(synthesis.charts[0].chart_type, "line");

        let request = &provider.requests()[0];
        assert!(request.json_mode);
        assert_eq!(request.temperature, 0.3);
        assert!(request.messages[1].content.contains("Margins are thin"));
    }

    #[tokio::test]
    async fn test_failure_is_empty() {
        let brain = Brain::new(Arc::new(MockLlmProvider::failing()));
        assert_eq!(synthesize(&brain, &[], "data", None).await, Synthesis::default());
    }
}
