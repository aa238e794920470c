use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::MetadataError;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("no downloaded input in {0}")]
    MissingInput(PathBuf),
    #[error("probe output {output:?} is not a usable duration")]
    DurationParse { output: String },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            source,
            path: path.into(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
