use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CortexError, Result};

const DEFAULT_TENANTS: &[&str] = &["TENANT_100", "TENANT_200", "TENANT_300"];
const DEFAULT_TOKEN_PATH: &str = "/snowflake/session/token";
const DEFAULT_SECURE_PROCEDURE: &str = "MULTI_TENANT_DEMO.CORE.RUN_TENANT_QUERY";
const DEFAULT_INFERENCE_MODEL: &str = "claude-3-5-sonnet";

/// Process configuration, read from the environment exactly once at startup
/// and passed by reference everywhere it is needed. Missing values are
/// reported by `/api/health` rather than failing startup; the first
/// authenticated call without a resolvable credential fails instead.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Account base URL, e.g. `https://myorg-myaccount.snowflakecomputing.com`.
    pub account_url: Option<String>,
    /// Fully qualified semantic view the Analyst targets.
    pub semantic_view: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    /// Owner-rights procedure that installs the session tenant binding,
    /// runs the statement under the filtered view, and removes the binding.
    pub secure_procedure: String,
    /// Personal access token for local/standalone runs.
    pub pat: Option<String>,
    /// Platform-provided short-lived token, present only inside the managed
    /// runtime. Checked before the PAT.
    pub oauth_token_path: PathBuf,
    /// Closed set of tenant identifiers accepted by `/api/chat`.
    pub tenants: Vec<String>,
    pub inference_model: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: usize,
    /// UI-facing configuration document served by `/api/app-config`.
    pub app_config_path: PathBuf,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let tenants = std::env::var("TENANTS")
            .map(|v| {
                v.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_TENANTS.iter().map(|t| t.to_string()).collect());

        Self {
            account_url: env_string("SNOWFLAKE_ACCOUNT_URL")
                .map(|u| u.trim_end_matches('/').to_string()),
            semantic_view: env_string("SEMANTIC_VIEW"),
            warehouse: env_string("SNOWFLAKE_WAREHOUSE"),
            database: env_string("SNOWFLAKE_DATABASE"),
            schema: env_string("SNOWFLAKE_SCHEMA"),
            secure_procedure: env_string("SECURE_PROCEDURE")
                .unwrap_or_else(|| DEFAULT_SECURE_PROCEDURE.to_string()),
            pat: env_string("SNOWFLAKE_PAT"),
            oauth_token_path: env_string("SNOWFLAKE_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH)),
            tenants,
            inference_model: env_string("INFERENCE_MODEL")
                .unwrap_or_else(|| DEFAULT_INFERENCE_MODEL.to_string()),
            poll_interval: Duration::from_millis(env_parse("POLL_INTERVAL_MS", 1000)),
            max_poll_attempts: env_parse("MAX_POLL_ATTEMPTS", 30) as usize,
            app_config_path: env_string("APP_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("app_config.json")),
            port: env_parse("PORT", 8080) as u16,
        }
    }

    /// Required environment variables that are currently absent.
    /// `SNOWFLAKE_PAT` only counts as missing when the platform token file
    /// is not available either.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = vec![];
        if self.account_url.is_none() {
            missing.push("SNOWFLAKE_ACCOUNT_URL");
        }
        if self.semantic_view.is_none() {
            missing.push("SEMANTIC_VIEW");
        }
        if self.warehouse.is_none() {
            missing.push("SNOWFLAKE_WAREHOUSE");
        }
        if self.pat.is_none() && !self.oauth_token_path.exists() {
            missing.push("SNOWFLAKE_PAT");
        }
        missing
    }

    pub fn base_url(&self) -> Result<&str> {
        self.account_url
            .as_deref()
            .ok_or_else(|| CortexError::Config("SNOWFLAKE_ACCOUNT_URL is not set".to_string()))
    }

    pub fn semantic_view(&self) -> Result<&str> {
        self.semantic_view
            .as_deref()
            .ok_or_else(|| CortexError::Config("SEMANTIC_VIEW is not set".to_string()))
    }

    /// Membership check against the configured tenant set. Comparison is
    /// case-insensitive; the canonical (configured) spelling is what gets
    /// passed to the secure procedure.
    pub fn canonical_tenant(&self, tenant: &str) -> Option<&str> {
        self.tenants
            .iter()
            .find(|t| t.eq_ignore_ascii_case(tenant.trim()))
            .map(|t| t.as_str())
    }

    pub fn is_valid_tenant(&self, tenant: &str) -> bool {
        self.canonical_tenant(tenant).is_some()
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            account_url: Some("https://acct.snowflakecomputing.com".into()),
            semantic_view: Some("DB.SCHEMA.SALES_VIEW".into()),
            warehouse: Some("DEMO_WH".into()),
            database: None,
            schema: None,
            secure_procedure: DEFAULT_SECURE_PROCEDURE.into(),
            pat: Some("pat-token".into()),
            oauth_token_path: PathBuf::from("/nonexistent/token"),
            tenants: vec!["TENANT_100".into(), "TENANT_200".into()],
            inference_model: DEFAULT_INFERENCE_MODEL.into(),
            poll_interval: Duration::from_millis(10),
            max_poll_attempts: 5,
            app_config_path: PathBuf::from("app_config.json"),
            port: 8080,
        }
    }

    #[test]
    fn tenant_membership_is_case_insensitive() {
        let cfg = test_config();
        assert!(cfg.is_valid_tenant("TENANT_100"));
        assert!(cfg.is_valid_tenant("tenant_200"));
        assert!(cfg.is_valid_tenant("  TENANT_100 "));
        assert!(!cfg.is_valid_tenant("TENANT_999"));
        assert!(!cfg.is_valid_tenant(""));
        assert_eq!(cfg.canonical_tenant("tenant_100"), Some("TENANT_100"));
    }

    #[test]
    fn missing_reports_absent_required_vars() {
        let mut cfg = test_config();
        assert!(cfg.missing().is_empty());

        cfg.account_url = None;
        cfg.pat = None;
        let missing = cfg.missing();
        assert!(missing.contains(&"SNOWFLAKE_ACCOUNT_URL"));
        assert!(missing.contains(&"SNOWFLAKE_PAT"));
        assert!(!missing.contains(&"SEMANTIC_VIEW"));
    }

    #[test]
    fn base_url_errors_before_any_network_call() {
        let mut cfg = test_config();
        cfg.account_url = None;
        let err = cfg.base_url().unwrap_err();
        assert!(err.to_string().contains("SNOWFLAKE_ACCOUNT_URL"));
    }
}
