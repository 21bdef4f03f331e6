use thiserror::Error;

/// Everything that can go wrong between accepting a request and returning a
/// reshaped Cortex response. Client-input validation happens in the server
/// crate before any of these can occur.
#[derive(Debug, Error)]
pub enum CortexError {
    /// Raised before any network call is attempted.
    #[error("configuration error: {0}")]
    Config(String),

    /// A non-success HTTP status from one of the remote Cortex services.
    /// The upstream status and body are preserved for diagnosis.
    #[error("{service} request failed with status {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The SQL engine reported a statement-level failure. Includes the
    /// statement text so the caller can see what was rejected.
    #[error("SQL execution failed: {message} (statement: {sql})")]
    Execution { message: String, sql: String },

    /// The statement never reached a terminal state within the poll budget.
    /// Distinct from an execution failure.
    #[error("statement did not complete within {attempts} status polls")]
    PollTimeout { attempts: usize },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CortexError>;
