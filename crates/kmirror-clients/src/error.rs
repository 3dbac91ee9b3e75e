//! Errors surfaced by external service clients.

use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("missing configuration: {0}")]
    Config(String),

    #[error("service unreachable: {0}")]
    Unreachable(String),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("attachment {0} is a linked URL, not a stored file")]
    LinkedAttachment(String),
}
