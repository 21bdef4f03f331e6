use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::CortexClient;
use crate::config::AppConfig;
use crate::error::{CortexError, Result};

/// One turn of conversation history, passed through to the Analyst
/// unchanged except for role normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// The Analyst only understands `user` and `assistant`; anything else
    /// (e.g. "analyst", "bot") is folded into `assistant`.
    pub fn normalized_role(&self) -> &'static str {
        if self.role.eq_ignore_ascii_case("user") {
            "user"
        } else {
            "assistant"
        }
    }
}

/// One item of the heterogeneous `content` list in an Analyst response.
/// The vendor tags items by `type`; unknown tags are tolerated and ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnalystContent {
    Sql { statement: String },
    Text { text: String },
    Suggestions { suggestions: Vec<String> },
    #[serde(other)]
    Unknown,
}

/// Which statement to keep when a response carries more than one
/// `sql`-tagged item. The vendor contract leaves this unspecified;
/// last-wins is the default here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlSelection {
    #[default]
    LastWins,
    FirstWins,
}

/// Folded Analyst response. `sql` absent means the question could not be
/// converted to a query; the suggestions (if any) are the disambiguation
/// path back to the user.
#[derive(Debug, Clone, Default)]
pub struct AnalystReply {
    pub sql: Option<String>,
    pub explanation: Option<String>,
    pub suggestions: Option<Vec<String>>,
    pub request_id: Option<String>,
    pub warnings: Vec<String>,
}

/// Fold the tagged content list into a reply: the selected `sql` item, the
/// last `text` item as explanation, the first `suggestions` list.
pub fn fold_content(items: Vec<AnalystContent>, pick: SqlSelection) -> AnalystReply {
    let mut reply = AnalystReply::default();
    for item in items {
        match item {
            AnalystContent::Sql { statement } => {
                if pick == SqlSelection::LastWins || reply.sql.is_none() {
                    reply.sql = Some(statement);
                }
            }
            AnalystContent::Text { text } => reply.explanation = Some(text),
            AnalystContent::Suggestions { suggestions } => {
                if reply.suggestions.is_none() {
                    reply.suggestions = Some(suggestions);
                }
            }
            AnalystContent::Unknown => {}
        }
    }
    reply
}

#[derive(Debug, Deserialize)]
struct AnalystResponse {
    #[serde(default)]
    message: AnalystMessage,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    warnings: Vec<AnalystWarning>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalystMessage {
    #[serde(default)]
    content: Vec<AnalystContent>,
}

#[derive(Debug, Deserialize)]
struct AnalystWarning {
    #[serde(default)]
    message: String,
}

impl CortexClient {
    /// Send the conversation (history + new user turn) to the Analyst and
    /// fold its content list. Aborts with the upstream status and body on
    /// any non-success response.
    pub async fn analyst_message(
        &self,
        cfg: &AppConfig,
        history: &[ChatMessage],
        question: &str,
        pick: SqlSelection,
    ) -> Result<AnalystReply> {
        let semantic_view = cfg.semantic_view()?;

        let mut messages: Vec<serde_json::Value> = history
            .iter()
            .map(|m| wire_message(m.normalized_role(), &m.content))
            .collect();
        messages.push(wire_message("user", question));

        let body = json!({
            "messages": messages,
            "semantic_view": semantic_view,
        });

        tracing::info!(question, history_len = history.len(), "calling analyst");
        let resp = self
            .credential
            .apply(self.http.post(self.endpoint("/api/v2/cortex/analyst/message")))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CortexError::Upstream {
                service: "analyst",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnalystResponse = resp.json().await?;
        let mut reply = fold_content(parsed.message.content, pick);
        reply.request_id = parsed.request_id;
        reply.warnings = parsed.warnings.into_iter().map(|w| w.message).collect();
        tracing::info!(
            has_sql = reply.sql.is_some(),
            has_suggestions = reply.suggestions.is_some(),
            request_id = reply.request_id.as_deref().unwrap_or("-"),
            "analyst replied"
        );
        Ok(reply)
    }
}

fn wire_message(role: &str, text: &str) -> serde_json::Value {
    json!({
        "role": role,
        "content": [{ "type": "text", "text": text }],
    })
}
