use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The inbound media envelope lacks the content hash needed for stable
    /// addressing. Caching under a message-id key would break dedup across
    /// distinct messages carrying identical bytes, so the fetch is refused.
    #[error("media envelope carries no content hash")]
    NoContentHash,

    #[error("download failed: {message}")]
    Download { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
        }
    }
}

impl wabridge_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

wabridge_common::impl_context!();
