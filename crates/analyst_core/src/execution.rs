use serde::Serialize;
use serde_json::{json, Value};

use crate::client::CortexClient;
use crate::config::AppConfig;
use crate::error::{CortexError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

/// Rows plus column metadata from the statements API. Rows are reshaped
/// from positional arrays into name-keyed objects; column semantics are
/// never interpreted beyond counting and naming.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Value>,
}

impl ExecutionResult {
    pub fn preview(&self, limit: usize) -> &[Value] {
        &self.rows[..self.rows.len().min(limit)]
    }
}

/// Double every single quote so the statement can be embedded as a string
/// literal inside the secure procedure invocation.
pub fn escape_sql_literal(sql: &str) -> String {
    sql.replace('\'', "''")
}

/// Wrap a statement in a call to the owner-rights procedure. The procedure
/// binds the remote session to the tenant, runs the statement under the
/// security-filtered view, and removes the binding whether or not the
/// statement succeeds.
pub fn secure_call_statement(procedure: &str, sql: &str, tenant: &str) -> String {
    format!(
        "CALL {}('{}', '{}')",
        procedure,
        escape_sql_literal(sql),
        tenant
    )
}

impl CortexClient {
    /// Execute a statement through the statements API. With a tenant the
    /// statement is routed through the secure procedure; without one it runs
    /// unscoped (debug path only).
    ///
    /// HTTP 200 carries the result; 202 means in-flight, in which case we
    /// poll the statement handle on a fixed interval up to the configured
    /// attempt bound.
    pub async fn execute_sql(
        &self,
        cfg: &AppConfig,
        sql: &str,
        tenant: Option<&str>,
    ) -> Result<ExecutionResult> {
        let statement = match tenant {
            Some(t) => secure_call_statement(&cfg.secure_procedure, sql, t),
            None => sql.to_string(),
        };

        let mut body = serde_json::Map::new();
        body.insert("statement".into(), json!(statement));
        body.insert("timeout".into(), json!(60));
        if let Some(wh) = &cfg.warehouse {
            body.insert("warehouse".into(), json!(wh));
        }
        if let Some(db) = &cfg.database {
            body.insert("database".into(), json!(db));
        }
        if let Some(schema) = &cfg.schema {
            body.insert("schema".into(), json!(schema));
        }

        let request_id = uuid::Uuid::new_v4();
        let url = format!(
            "{}?requestId={}",
            self.endpoint("/api/v2/statements"),
            request_id
        );

        tracing::info!(tenant = tenant.unwrap_or("-"), %request_id, "submitting statement");
        let resp = self
            .credential
            .apply(self.http.post(&url))
            .json(&Value::Object(body))
            .send()
            .await?;

        match resp.status().as_u16() {
            200 => parse_result_body(&resp.json().await?, sql),
            202 => {
                let submitted: Value = resp.json().await?;
                let handle = submitted
                    .get("statementHandle")
                    .and_then(|h| h.as_str())
                    .ok_or_else(|| CortexError::Execution {
                        message: "accepted response carried no statementHandle".to_string(),
                        sql: sql.to_string(),
                    })?
                    .to_string();
                self.poll_statement(cfg, &handle, sql).await
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(CortexError::Execution {
                    message: format!("status {status}: {body}"),
                    sql: sql.to_string(),
                })
            }
        }
    }

    /// Await an in-flight statement. 200 is the terminal success status,
    /// 202 keeps waiting, anything else is an execution failure. Exhausting
    /// the attempt bound is a timeout, not an execution failure.
    async fn poll_statement(
        &self,
        cfg: &AppConfig,
        handle: &str,
        sql: &str,
    ) -> Result<ExecutionResult> {
        let url = self.endpoint(&format!("/api/v2/statements/{handle}"));
        for attempt in 1..=cfg.max_poll_attempts {
            tokio::time::sleep(cfg.poll_interval).await;
            let resp = self.credential.apply(self.http.get(&url)).send().await?;
            match resp.status().as_u16() {
                200 => {
                    tracing::debug!(handle, attempt, "statement completed");
                    return parse_result_body(&resp.json().await?, sql);
                }
                202 => {
                    tracing::debug!(handle, attempt, "statement still running");
                }
                status => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(CortexError::Execution {
                        message: format!("status {status}: {body}"),
                        sql: sql.to_string(),
                    });
                }
            }
        }
        Err(CortexError::PollTimeout {
            attempts: cfg.max_poll_attempts,
        })
    }
}

/// Reshape a terminal statements-API body. A terminal message containing an
/// error marker counts as failure even on a success status.
fn parse_result_body(body: &Value, sql: &str) -> Result<ExecutionResult> {
    if let Some(message) = body.get("message").and_then(|m| m.as_str()) {
        if message.to_ascii_lowercase().contains("error") {
            return Err(CortexError::Execution {
                message: message.to_string(),
                sql: sql.to_string(),
            });
        }
    }

    let columns: Vec<Column> = body
        .pointer("/resultSetMetaData/rowType")
        .and_then(|rt| rt.as_array())
        .map(|cols| {
            cols.iter()
                .map(|c| Column {
                    name: c
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    column_type: c
                        .get("type")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let rows = body
        .get("data")
        .and_then(|d| d.as_array())
        .map(|data| {
            data.iter()
                .map(|row| match row.as_array() {
                    Some(values) if !columns.is_empty() => {
                        let mut obj = serde_json::Map::new();
                        for (i, col) in columns.iter().enumerate() {
                            obj.insert(col.name.clone(), values.get(i).cloned().unwrap_or(Value::Null));
                        }
                        Value::Object(obj)
                    }
                    _ => row.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ExecutionResult { columns, rows })
}
