use serde::Deserialize;
use serde_json::json;

use crate::client::CortexClient;
use crate::config::AppConfig;
use crate::error::{CortexError, Result};
use crate::execution::ExecutionResult;

/// Rows included in the inference payload are capped here so a large result
/// set cannot blow up the request body.
pub const ROW_PREVIEW_LIMIT: usize = 50;

pub const SYSTEM_PROMPT: &str = "You are a senior data analyst. You are given a business question, the \
explanation of the SQL that answered it, and the resulting rows. Write a \
short narrative answer for a business user: state the headline finding \
first, mention notable comparisons or outliers, and keep it under 150 \
words. Do not restate the SQL and do not invent numbers that are not in \
the rows.";

#[derive(Debug, Deserialize)]
struct CompletionEvent {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Pull-based iterator over the text deltas of an SSE completion body.
/// Splits on blank-line event boundaries, takes `data:` payloads, skips the
/// `[DONE]` sentinel, and drops malformed events with a warning so one
/// corrupt fragment cannot abort an otherwise-complete response.
pub struct SseDeltas<'a> {
    events: std::str::Split<'a, &'static str>,
}

impl<'a> SseDeltas<'a> {
    pub fn new(body: &'a str) -> Self {
        Self {
            events: body.split("\n\n"),
        }
    }
}

impl Iterator for SseDeltas<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        for event in self.events.by_ref() {
            let mut payload = String::new();
            for line in event.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    payload.push_str(rest.trim_start());
                }
            }
            if payload.is_empty() || payload == "[DONE]" {
                continue;
            }
            match serde_json::from_str::<CompletionEvent>(&payload) {
                Ok(event) => {
                    let text = event
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta)
                        .and_then(|d| d.content);
                    if let Some(text) = text {
                        if !text.is_empty() {
                            return Some(text);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed completion event");
                }
            }
        }
        None
    }
}

/// Reassemble the full narrative by folding the delta sequence in arrival
/// order.
pub fn collect_content(body: &str) -> String {
    SseDeltas::new(body).collect()
}

/// Build the user prompt from the question, the Analyst's explanation, and
/// a capped row preview.
pub fn build_user_prompt(question: &str, explanation: &str, result: &ExecutionResult) -> String {
    let columns: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    let preview = serde_json::to_string(result.preview(ROW_PREVIEW_LIMIT)).unwrap_or_default();
    format!(
        "Question: {question}\n\nQuery explanation: {explanation}\n\nColumns: {}\n\nRows (first {} of {}): {preview}",
        columns.join(", "),
        result.preview(ROW_PREVIEW_LIMIT).len(),
        result.rows.len(),
    )
}

impl CortexClient {
    /// Ask the inference service for a narrative summary of an execution
    /// result. Returns the reconstructed streamed text. Callers treat a
    /// failure here as degradation, not as a request failure.
    pub async fn summarize(
        &self,
        cfg: &AppConfig,
        question: &str,
        explanation: &str,
        result: &ExecutionResult,
    ) -> Result<String> {
        let body = json!({
            "model": cfg.inference_model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_prompt(question, explanation, result) }
            ],
            "stream": true,
        });

        tracing::info!(model = %cfg.inference_model, rows = result.rows.len(), "calling inference");
        let resp = self
            .credential
            .apply(
                self.http
                    .post(self.endpoint("/api/v2/cortex/inference:complete"))
                    .header("Accept", "text/event-stream"),
            )
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CortexError::Upstream {
                service: "inference",
                status: status.as_u16(),
                body,
            });
        }

        Ok(collect_content(&resp.text().await?))
    }
}
