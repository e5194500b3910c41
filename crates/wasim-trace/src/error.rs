//! Trace store error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    /// The store cannot be reached or has been shut down.
    #[error("trace store unavailable: {0}")]
    Unavailable(String),

    #[error("trace store i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run sequence file holds something other than an integer.
    #[error("corrupt run sequence in {path}: {content:?}")]
    CorruptSequence { path: PathBuf, content: String },

    #[error("trace record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type TraceResult<T> = Result<T, TraceError>;
