//! Finance, risk and growth personas run in parallel over the same context.

use super::language_instruction;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tabula_core::{Brain, CompletionRequest, LlmError};
use tracing::{debug, warn};

pub const ANALYSIS_UNAVAILABLE: &str = "Analysis unavailable.";
const TEMPERATURE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persona {
    pub key: &'static str,
    pub role: &'static str,
    pub focus: &'static str,
}

impl Persona {
    pub fn system_prompt(&self) -> String {
        format!("You are the {}. {}", self.role, self.focus)
    }
}

pub const PERSONAS: [Persona; 3] = [
    Persona {
        key: "CFO",
        role: "CFO Persona (Finance & Cost Optimization)",
        focus: "Analyze P&L, profit margins, cost centers, and overall financial efficiency. \
Give 2 highly specific financial recommendations.",
    },
    Persona {
        key: "Risk",
        role: "Risk Assessor Persona",
        focus: "Analyze anomalies, outliers, and variance. Identify potential operational or \
financial risks and give 2 specific mitigation recommendations.",
    },
    Persona {
        key: "CMO",
        role: "CMO Persona (Marketing & Segments)",
        focus: "Analyze clusters, market segments, and feature importance. Give 2 specific \
strategic recommendations for growth and targeting.",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaReport {
    pub persona: String,
    pub role: String,
    pub analysis: String,
}

impl PersonaReport {
    pub fn unavailable(persona: &Persona) -> Self {
        Self {
            persona: persona.key.to_string(),
            role: persona.role.to_string(),
            analysis: ANALYSIS_UNAVAILABLE.to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.analysis != ANALYSIS_UNAVAILABLE
    }
}

/// User prompt shared by every persona.
pub fn persona_prompt(context: &str, language: Option<&str>) -> String {
    format!(
        "Based on the following data, provide your analysis and recommendations:\n{}{}",
        context,
        language_instruction(language)
    )
}

async fn ask(
    brain: &Brain,
    persona: &Persona,
    prompt: &str,
    max_tokens: usize,
) -> Result<String, LlmError> {
    let request = CompletionRequest::prompt(persona.system_prompt(), prompt)
        .with_temperature(TEMPERATURE)
        .with_max_tokens(max_tokens);
    let response = brain.complete(request).await?;
    let text = response.text().trim();
    if text.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }
    Ok(text.to_string())
}

/// One persona. Failures yield [`ANALYSIS_UNAVAILABLE`].
pub async fn run_persona(
    brain: &Brain,
    persona: &Persona,
    prompt: &str,
    max_tokens: usize,
) -> PersonaReport {
    match ask(brain, persona, prompt, max_tokens).await {
        Ok(analysis) => {
            debug!(persona = persona.key, chars = analysis.len(), "Persona analysis complete");
            PersonaReport {
                persona: persona.key.to_string(),
                role: persona.role.to_string(),
                analysis,
            }
        }
        Err(e) => {
            warn!(persona = persona.key, error = %e, "Persona analysis failed");
            PersonaReport::unavailable(persona)
        }
    }
}

/// All personas concurrently, in [`PERSONAS`] order.
pub async fn run_personas(
    brain: &Brain,
    context: &str,
    language: Option<&str>,
    max_tokens: usize,
) -> Vec<PersonaReport> {
    let prompt = persona_prompt(context, language);
    join_all(
        PERSONAS
            .iter()
            .map(|persona| run_persona(brain, persona, &prompt, max_tokens)),
    )
    .await
}
