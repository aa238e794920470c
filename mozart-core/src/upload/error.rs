use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid token file {path}: {source}")]
    Token {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("token file {0} has no token or access_token field")]
    MissingToken(PathBuf),
    #[error("upload session response carried no location header")]
    MissingSession,
    #[error("platform rejected the upload: {0}")]
    Rejected(String),
}

impl UploadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UploadError::Io {
            source,
            path: path.into(),
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
