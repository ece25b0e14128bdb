use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("API error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl ExchangeError {
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            Self::Http(e) => e.status().map(|status| status.as_u16() as i64),
            _ => None,
        }
    }

    /// Exchange messages read "<primary>: <detail>"; only the primary clause is kept.
    pub fn primary_message(&self) -> String {
        match self {
            Self::Api { msg, .. } => primary_clause(msg),
            Self::Http(e) if e.is_timeout() => String::from("request timed out"),
            _ => self.to_string(),
        }
    }
}

fn primary_clause(msg: &str) -> String {
    match msg.split(':').next().map(str::trim) {
        Some(clause) if !clause.is_empty() => clause.to_string(),
        _ => msg.trim().to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
