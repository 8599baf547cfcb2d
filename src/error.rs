use thiserror::Error;

/// Error taxonomy for the scheduler core and its driver loop.
///
/// Policy (who does what with each kind) lives in the transport layer, not
/// here: `InvalidEvent`/`Capacity` are per-event and the batch continues;
/// `Protocol`/`Transport` end the connection; `Internal` drops the tick.
#[derive(Error, Debug)]
pub enum SchedError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Clone for SchedError {
    fn clone(&self) -> Self {
        match self {
            SchedError::InvalidEvent(s) => SchedError::InvalidEvent(s.clone()),
            SchedError::Capacity(s) => SchedError::Capacity(s.clone()),
            SchedError::NotFound(s) => SchedError::NotFound(s.clone()),
            SchedError::Protocol(s) => SchedError::Protocol(s.clone()),
            SchedError::Transport(e) => SchedError::Protocol(e.to_string()),
            SchedError::Internal(s) => SchedError::Internal(s.clone()),
        }
    }
}

impl From<serde_json::Error> for SchedError {
    fn from(e: serde_json::Error) -> Self {
        SchedError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SchedError>;
