use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// A lookup that could not be answered by the grade source. Never used for
/// "no rows"; that is a successful [`crate::models::LookupOutcome::NoMatch`].
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request to grade service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("grade service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response from grade service: {0}")]
    Decode(String),
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),
}
