pub mod analyst;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod execution;
pub mod inference;

pub use analyst::{AnalystReply, ChatMessage, SqlSelection};
pub use auth::Credential;
pub use client::CortexClient;
pub use config::AppConfig;
pub use error::{CortexError, Result};
pub use execution::{Column, ExecutionResult};
