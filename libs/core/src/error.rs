use thiserror::Error;

/// Failure to deliver an outbound activity.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection closed before the activity could be sent")]
    Closed,
    #[error("activity could not be encoded")]
    Encode(#[from] serde_json::Error),
    #[error("channel rejected activity: status={status} body={body}")]
    Rejected { status: u16, body: String },
    #[error("channel transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("outbound activity is missing {0}")]
    Unaddressed(&'static str),
}

/// Anything that ends a turn early. Routed to the error boundary, never to the transport.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("send failed: {0}")]
    Send(#[from] SendError),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

pub type TurnResult<T = ()> = std::result::Result<T, TurnError>;
