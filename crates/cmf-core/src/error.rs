use std::path::PathBuf;
use thiserror::Error;

pub type CmfResult<T> = Result<T, CmfError>;

#[derive(Debug, Error)]
pub enum CmfError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgo(String),

    #[error("unknown object kind: {0}")]
    UnknownKind(String),

    #[error("invalid object id: {0}")]
    InvalidId(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
