use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid daemon url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("daemon request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("daemon returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid daemon response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("notification stream closed by daemon")]
    StreamClosed,
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Reports whether `err`, or anything it wraps, is a cancellation.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ClientError>()
            .is_some_and(ClientError::is_cancelled)
    })
}
