use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, Role,
    },
    Client,
};
use serde::Serialize;

use crate::error::AppError;
use crate::models::SCORE_COLUMN;
use crate::services::chart::ChartData;
use crate::services::ranking::RankedTable;

pub const DEFAULT_REPORT_ROWS: usize = 3;

const DIVIDER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const NO_CRITERIA: &str = "None (Using AI-powered evaluation)";

/// Everything the report needs from a session, captured up front so the
/// session lock is not held while the model answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportInput {
    pub summaries: Vec<String>,
    pub criteria_text: String,
}

impl ReportInput {
    pub fn from_ranked(ranked: &RankedTable, top_n: usize) -> Result<Self, AppError> {
        Ok(Self {
            summaries: supplier_summaries(ranked, top_n)?,
            criteria_text: criteria_text(ranked),
        })
    }
}

/// One block per top row: `Supplier {row id + 1}` then a `• column: value`
/// line per present value. The score column is left out.
pub fn supplier_summaries(ranked: &RankedTable, top_n: usize) -> Result<Vec<String>, AppError> {
    let records = ranked.table.records(top_n)?;
    Ok(records
        .iter()
        .zip(ranked.table.row_ids())
        .map(|(record, id)| {
            let lines: Vec<String> = record
                .iter()
                .filter(|(column, value)| column != SCORE_COLUMN && !value.is_missing())
                .map(|(column, value)| format!("• {}: {}", column, value))
                .collect();
            format!("Supplier {}:\n\n{}", id + 1, lines.join("\n"))
        })
        .collect())
}

pub fn criteria_text(ranked: &RankedTable) -> String {
    let criteria = ranked.mode.criteria();
    if criteria.is_empty() {
        NO_CRITERIA.to_string()
    } else {
        criteria
            .iter()
            .map(|c| c.column.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn build_prompt(input: &ReportInput) -> String {
    format!(
        r#"**Evaluation Criteria**: {}
**Supplier Data**:
{}
---
**Task**:
1. **Comparison Table**:
   - Create a markdown table comparing suppliers against each criterion
   - Use 1-5 rating scale
   - Include weighted/average score
2. **Bar Chart Visualization**:
   - Use text-based bar charts for scores (e.g., '5/5')
3. **Decision & Justification**:
   - Recommend the best supplier with reasoning
   - Highlight trade-offs and strategic alignment
4. **Pros and Cons**:
   - List exactly 3 pros and 3 cons per supplier
5. **Final Recommendation**:
   - Professional summary with benefits and risks
Format the response using markdown with clear section headings."#,
        input.criteria_text,
        input.summaries.join("\n\n")
    )
}

/// Summaries framed by dividers, followed by the model's evaluation.
pub fn assemble_report(input: &ReportInput, evaluation: &str) -> String {
    let blocks: Vec<String> = input
        .summaries
        .iter()
        .map(|summary| format!("\n{}\n{}\n{}", DIVIDER, summary, DIVIDER))
        .collect();
    format!("{}\n\nGenAI Evaluation:\n{}", blocks.join("\n"), evaluation.trim())
}

/// Downloadable markdown document: the stored report followed by the chart
/// data as a table, one row per series.
pub fn render_document(report: &str, active_filters: &[String], chart: &ChartData, by_criteria: bool) -> String {
    let mut doc = String::from("# Supplier Evaluation Report\n\n");

    if !active_filters.is_empty() {
        doc.push_str("**Active filters**:\n");
        for filter in active_filters {
            doc.push_str(&format!("- {}\n", filter));
        }
        doc.push('\n');
    }

    doc.push_str(report.trim());
    doc.push_str("\n\n");

    let heading = if by_criteria {
        "Supplier Comparison Chart"
    } else {
        "Primary Attribute Comparison"
    };
    doc.push_str(&format!("## {}\n\n", heading));
    if chart.series.is_empty() {
        doc.push_str("No numeric columns to chart.\n");
        return doc;
    }

    let cell = |text: &str| text.replace('|', "\\|");
    let labels: Vec<String> = chart.labels.iter().map(|l| cell(l)).collect();
    doc.push_str(&format!("_{}_\n\n", chart.title));
    doc.push_str(&format!("| {} | {} |\n", cell(&chart.y_label), labels.join(" | ")));
    doc.push_str(&format!("|{}\n", "---|".repeat(labels.len() + 1)));
    for series in &chart.series {
        let values: Vec<String> = series
            .values
            .iter()
            .map(|v| v.map(|x| x.to_string()).unwrap_or_default())
            .collect();
        doc.push_str(&format!("| {} | {} |\n", cell(&series.name), values.join(" | ")));
    }
    doc
}

pub struct ReportGenerator {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl ReportGenerator {
    pub fn new(api_key: Option<&str>, model: &str) -> Self {
        let client = api_key.map(|key| Client::with_config(OpenAIConfig::new().with_api_key(key)));
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn generate(&self, input: &ReportInput) -> Result<String, AppError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::LlmError("Report generation is not configured (OPENAI_API_KEY missing)".to_string()))?;

        if input.summaries.is_empty() {
            return Err(AppError::InvalidInput("No ranked suppliers to report on".to_string()));
        }

        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: "You are a senior analyst specializing in supplier evaluation and strategic sourcing."
                    .to_string(),
                name: None,
                role: Role::System,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(build_prompt(input)),
                name: None,
                role: Role::User,
            }),
        ];

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.3),
            ..Default::default()
        };

        tracing::info!(
            "Requesting supplier report from {} for {} suppliers",
            self.model,
            input.summaries.len()
        );
        let start = std::time::Instant::now();

        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::LlmError(e.to_string()))?;

        let evaluation = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::LlmError("Report service returned no content".to_string()))?;

        tracing::info!("Report generated in {:?}", start.elapsed());
        Ok(assemble_report(input, &evaluation))
    }
}
