use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad response header")]
    BadHeader,
    #[error("expected at least one server in response")]
    EmptyPage,
    #[error("early EOF while parsing server record")]
    Truncated,
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("callback rejected page: {0}")]
    Callback(anyhow::Error),
    #[error("failed to resolve host {host}: {reason}")]
    Dns { host: String, reason: String },
    #[error("query cancelled")]
    Cancelled,
}

impl Error {
    /// Only transport failures are worth another attempt; everything else is
    /// either a protocol violation or a caller decision.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
