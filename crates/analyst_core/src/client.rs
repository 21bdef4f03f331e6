use crate::auth::Credential;
use crate::config::AppConfig;
use crate::error::Result;

/// Thin handle over the three Cortex endpoints. Holds the shared reqwest
/// client, the resolved account base URL, and the credential picked at
/// construction time. Cheap to clone; carries no per-request state, so one
/// instance serves any number of concurrent request handlers.
#[derive(Debug, Clone)]
pub struct CortexClient {
    pub(crate) http: reqwest::Client,
    pub(crate) base: String,
    pub(crate) credential: Credential,
}

impl CortexClient {
    /// Resolve base URL and credential from config. Fails with a
    /// configuration error before any network traffic when either is absent.
    pub fn new(http: reqwest::Client, cfg: &AppConfig) -> Result<Self> {
        let base = cfg.base_url()?.trim_end_matches('/').to_string();
        let credential = Credential::resolve(cfg)?;
        Ok(Self {
            http,
            base,
            credential,
        })
    }

    pub fn auth_method(&self) -> &'static str {
        self.credential.method()
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}
