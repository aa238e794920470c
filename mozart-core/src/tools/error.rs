use std::path::PathBuf;

use thiserror::Error;

use super::Tool;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} not found at {path}")]
    NotFound { tool: Tool, path: PathBuf },
    #[error("{tool} exited with status {status:?} ({args}): {stderr}")]
    Execution {
        tool: Tool,
        args: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: Tool,
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn tool(&self) -> Tool {
        match self {
            ToolError::NotFound { tool, .. }
            | ToolError::Execution { tool, .. }
            | ToolError::Spawn { tool, .. } => *tool,
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
