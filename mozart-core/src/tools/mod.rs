mod error;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolsSection;

pub use error::{ToolError, ToolResult};

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    Transcode,
    Probe,
    Download,
}

impl Tool {
    fn version_flag(self) -> &'static str {
        match self {
            Tool::Transcode | Tool::Probe => "-version",
            Tool::Download => "--version",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tool::Transcode => "ffmpeg",
            Tool::Probe => "ffprobe",
            Tool::Download => "yt-dlp",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub yt_dlp: PathBuf,
}

impl From<&ToolsSection> for ToolPaths {
    fn from(section: &ToolsSection) -> Self {
        Self {
            ffmpeg: section.ffmpeg.clone(),
            ffprobe: section.ffprobe_path(),
            yt_dlp: section.yt_dlp.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs the media binaries with explicit argument vectors. Blocks the
/// calling task until the child exits; there is no timeout.
pub struct ToolRunner {
    paths: ToolPaths,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for ToolRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRunner")
            .field("paths", &self.paths)
            .finish()
    }
}

impl ToolRunner {
    pub fn new(paths: ToolPaths) -> Self {
        Self {
            paths,
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn path(&self, tool: Tool) -> &Path {
        match tool {
            Tool::Transcode => &self.paths.ffmpeg,
            Tool::Probe => &self.paths.ffprobe,
            Tool::Download => &self.paths.yt_dlp,
        }
    }

    pub async fn invoke(&self, tool: Tool, args: &[String]) -> ToolResult<ToolOutput> {
        let program = self.path(tool);
        debug!(%tool, program = %program.display(), args = ?args, "invoking tool");
        let started = Instant::now();
        let output = self
            .executor
            .run(program, args)
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => ToolError::NotFound {
                    tool,
                    path: program.to_path_buf(),
                },
                _ => ToolError::Spawn { tool, source },
            })?;
        let elapsed = started.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(%tool, status = ?output.status.code(), elapsed_ms = elapsed.as_millis() as u64, "tool exited");
        if !stderr.is_empty() {
            debug!(%tool, %stderr, "tool stderr");
        }
        if !output.status.success() {
            return Err(ToolError::Execution {
                tool,
                args: args.join(" "),
                status: output.status.code(),
                stderr,
            });
        }
        Ok(ToolOutput {
            stdout,
            stderr,
            elapsed,
        })
    }

    /// Startup presence check; returns the first line of the version banner.
    pub async fn check_available(&self, tool: Tool) -> ToolResult<String> {
        let output = self
            .invoke(tool, &[tool.version_flag().to_string()])
            .await?;
        Ok(output.stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::sync::Mutex;

    type RecordedCalls = Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>;

    struct ScriptedExecutor {
        calls: RecordedCalls,
        status: i32,
        stdout: &'static str,
        stderr: &'static str,
        missing: bool,
    }

    impl ScriptedExecutor {
        fn build(
            status: i32,
            stdout: &'static str,
            stderr: &'static str,
        ) -> (Arc<dyn CommandExecutor>, RecordedCalls) {
            let calls: RecordedCalls = Arc::new(Mutex::new(Vec::new()));
            let executor: Arc<dyn CommandExecutor> = Arc::new(Self {
                calls: Arc::clone(&calls),
                status,
                stdout,
                stderr,
                missing: false,
            });
            (executor, calls)
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_path_buf(), args.to_vec()));
            if self.missing {
                return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
            }
            Ok(Output {
                status: std::process::ExitStatus::from_raw(self.status),
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: self.stderr.as_bytes().to_vec(),
            })
        }
    }

    fn paths() -> ToolPaths {
        ToolPaths {
            ffmpeg: PathBuf::from("/opt/bin/ffmpeg"),
            ffprobe: PathBuf::from("/opt/bin/ffprobe"),
            yt_dlp: PathBuf::from("/opt/bin/yt-dlp"),
        }
    }

    #[tokio::test]
    async fn invoke_passes_argument_vector_verbatim() {
        let (executor, calls) = ScriptedExecutor::build(0, "30.48\n", "");
        let runner = ToolRunner::new(paths()).with_executor(executor);
        let args = vec!["-i".to_string(), "it's a file.mp4".to_string()];
        let output = runner.invoke(Tool::Probe, &args).await.unwrap();
        assert_eq!(output.stdout.trim(), "30.48");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, PathBuf::from("/opt/bin/ffprobe"));
        assert_eq!(calls[0].1, args);
    }

    #[tokio::test]
    async fn non_zero_exit_maps_to_execution_error() {
        let (executor, _) = ScriptedExecutor::build(1 << 8, "", "Invalid data found\n");
        let runner = ToolRunner::new(paths()).with_executor(executor);
        let err = runner
            .invoke(Tool::Transcode, &["-i".into(), "input.webm".into()])
            .await
            .unwrap_err();
        match err {
            ToolError::Execution {
                tool,
                args,
                status,
                stderr,
            } => {
                assert_eq!(tool, Tool::Transcode);
                assert_eq!(args, "-i input.webm");
                assert_eq!(status, Some(1));
                assert_eq!(stderr, "Invalid data found");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_maps_to_not_found() {
        let calls: RecordedCalls = Arc::new(Mutex::new(Vec::new()));
        let executor = Arc::new(ScriptedExecutor {
            calls,
            status: 0,
            stdout: "",
            stderr: "",
            missing: true,
        });
        let runner = ToolRunner::new(paths()).with_executor(executor);
        let err = runner.check_available(Tool::Download).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound { tool: Tool::Download, .. }));
        assert_eq!(err.tool(), Tool::Download);
    }

    #[tokio::test]
    async fn check_available_reports_banner_line() {
        let (executor, calls) =
            ScriptedExecutor::build(0, "ffmpeg version 6.1 Copyright\nbuilt with gcc\n", "");
        let runner = ToolRunner::new(paths()).with_executor(executor);
        let banner = runner.check_available(Tool::Transcode).await.unwrap();
        assert_eq!(banner, "ffmpeg version 6.1 Copyright");
        assert_eq!(calls.lock().unwrap()[0].1, vec!["-version".to_string()]);
    }
}
