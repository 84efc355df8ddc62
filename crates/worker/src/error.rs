use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn worker `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
