use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Fatal by contract: the caller terminates the whole process. The
    /// remaining pending recipients are already durably persisted and an
    /// audit entry appended by the time this is returned.
    #[error("send to {recipient} failed: {reason}")]
    SendFailed {
        recipient: String,
        reason: anyhow::Error,
    },

    #[error("{0}")]
    Message(String),
}

impl wabridge_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

wabridge_common::impl_context!();
