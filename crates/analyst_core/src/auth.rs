use reqwest::RequestBuilder;

use crate::config::AppConfig;
use crate::error::{CortexError, Result};

/// Resolved credential for authenticated Cortex calls. Two mutually
/// exclusive sources: the platform-provided short-lived OAuth token (only
/// present inside the managed runtime) and a personal access token from
/// configuration for local runs. The token file wins when both exist.
#[derive(Debug, Clone)]
pub enum Credential {
    Oauth(String),
    Pat(String),
}

impl Credential {
    pub fn resolve(cfg: &AppConfig) -> Result<Self> {
        if let Ok(token) = std::fs::read_to_string(&cfg.oauth_token_path) {
            let token = token.trim();
            if !token.is_empty() {
                tracing::debug!(path = %cfg.oauth_token_path.display(), "using platform OAuth token");
                return Ok(Self::Oauth(token.to_string()));
            }
        }
        if let Some(pat) = cfg.pat.as_deref().filter(|p| !p.trim().is_empty()) {
            return Ok(Self::Pat(pat.trim().to_string()));
        }
        Err(CortexError::Config(format!(
            "no credential available: mount a platform token at {} or set SNOWFLAKE_PAT",
            cfg.oauth_token_path.display()
        )))
    }

    /// Short name for diagnostics (`/api/debug`).
    pub fn method(&self) -> &'static str {
        match self {
            Self::Oauth(_) => "oauth",
            Self::Pat(_) => "pat",
        }
    }

    /// Attach the Authorization header plus the token-type marker the
    /// statements API expects for each credential kind.
    pub fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Oauth(token) => req
                .bearer_auth(token)
                .header("X-Snowflake-Authorization-Token-Type", "OAUTH"),
            Self::Pat(token) => req
                .bearer_auth(token)
                .header(
                    "X-Snowflake-Authorization-Token-Type",
                    "PROGRAMMATIC_ACCESS_TOKEN",
                ),
        }
    }
}
