use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to read trace file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid trace json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("trace contains no threads")]
    EmptyTrace,
    #[error("invalid trace layout: {0}")]
    Layout(String),
}
