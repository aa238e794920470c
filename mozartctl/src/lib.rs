pub mod logging;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mozart_core::pipeline::ItemStatus;
use mozart_core::{
    clean_workspace, collect_rendered, load_config, select, BatchDriver, BatchReport, CleanReport,
    MozartConfig, SelectionMode, Tool, ToolPaths, ToolRunner, UploadRecord, UploadRunner,
    UploadStatus, YoutubeMetadataClient, YoutubeUploader,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] mozart_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("tool check failed: {0}")]
    Tool(#[from] mozart_core::ToolError),
    #[error("batch error: {0}")]
    Batch(#[from] mozart_core::BatchError),
    #[error("metadata client error: {0}")]
    Metadata(#[from] mozart_core::MetadataError),
    #[error("upload error: {0}")]
    Upload(#[from] mozart_core::UploadError),
    #[error("cleanup failed: {0}")]
    Clean(#[from] mozart_core::CleanError),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Loops downloaded clips into long-form videos and uploads them", long_about = None)]
pub struct Cli {
    /// Path to mozart.toml
    #[arg(long, default_value = "mozart.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Downloads and renders every link in the links file
    Run(RunArgs),
    /// Checks tools, asset and configuration
    Check,
    /// Uploads rendered videos
    Upload(UploadArgs),
    /// Removes work directories of rendered items
    Clean(CleanArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Links file overriding paths.links_file
    #[arg(long)]
    pub links: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Which rendered videos to upload
    #[arg(long, value_enum, default_value_t = UploadMode::One)]
    pub mode: UploadMode,
    /// Lists what would be uploaded without contacting the platform
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UploadMode {
    All,
    One,
    Few,
}

impl From<UploadMode> for SelectionMode {
    fn from(mode: UploadMode) -> Self {
        match mode {
            UploadMode::All => SelectionMode::All,
            UploadMode::One => SelectionMode::One,
            UploadMode::Few => SelectionMode::Few,
        }
    }
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Remove every work directory, rendered or not
    #[arg(long, default_value_t = false)]
    pub all: bool,
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;
    if matches!(cli.command, Commands::Run(_)) {
        context.config.validate()?;
    }
    let (log_path, _guard) = logging::init(&context.config.logging)?;
    info!(config = %context.config_path.display(), log = %log_path.display(), "mozartctl started");

    match &cli.command {
        Commands::Run(args) => {
            context.ensure_tools().await?;
            let report = context.run_batch(args).await?;
            render(&report, cli.format)?;
        }
        Commands::Check => {
            let report = context.health_check().await;
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
        Commands::Upload(args) => {
            let records = context.upload(args).await?;
            render(&records, cli.format)?;
        }
        Commands::Clean(args) => {
            let report = context.clean(args)?;
            render(&report, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: MozartConfig,
    config_path: PathBuf,
    tools: Arc<ToolRunner>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_config(&cli.config)?;
        Ok(Self::from_config(cli.config.clone(), config))
    }

    fn from_config(config_path: PathBuf, config: MozartConfig) -> Self {
        let tools = Arc::new(ToolRunner::new(ToolPaths::from(&config.tools)));
        Self {
            config,
            config_path,
            tools,
        }
    }

    /// Both binaries must answer before any link is touched.
    async fn ensure_tools(&self) -> Result<()> {
        for tool in [Tool::Transcode, Tool::Download] {
            let banner = self.tools.check_available(tool).await?;
            info!(%tool, %banner, "tool available");
        }
        Ok(())
    }

    async fn run_batch(&self, args: &RunArgs) -> Result<BatchReport> {
        let links = args
            .links
            .clone()
            .unwrap_or_else(|| self.config.paths.links_file.clone());
        let metadata = Arc::new(YoutubeMetadataClient::new(&self.config.youtube)?);
        let driver = BatchDriver::from_config(&self.config, self.tools.clone(), metadata);
        driver.prepare().await?;
        Ok(driver.run_file(&links).await?)
    }

    async fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = vec![HealthEntry::ok(
            "config",
            format!("{}", self.config_path.display()),
        )];
        if let Err(err) = self.config.validate() {
            results.push(HealthEntry::error("config values", err.to_string()));
        }
        for tool in [Tool::Transcode, Tool::Probe, Tool::Download] {
            let entry = match self.tools.check_available(tool).await {
                Ok(banner) => HealthEntry::ok(tool.to_string(), banner),
                Err(err) => HealthEntry::error(tool.to_string(), err.to_string()),
            };
            results.push(entry);
        }
        results.push(check_path("asset video", &self.config.paths.asset_video, true));
        results.push(check_path("links file", &self.config.paths.links_file, true));
        results.push(check_path("token file", &self.config.upload.token_file, false));
        let has_key = self
            .config
            .youtube
            .api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false);
        if !has_key {
            results.push(HealthEntry::warn(
                "youtube api key",
                format!(
                    "not set, titles fall back to {:?}",
                    self.config.youtube.fallback_title
                ),
            ));
        }
        results
    }

    async fn upload(&self, args: &UploadArgs) -> Result<Vec<UploadRecord>> {
        let rendered = collect_rendered(&self.config.paths.output_dir)?;
        let selected = select(rendered, args.mode.into(), &mut rand::thread_rng());
        info!(videos = selected.len(), mode = ?args.mode, "selected videos for upload");
        let uploader = Arc::new(YoutubeUploader::new(&self.config.upload)?);
        let runner = UploadRunner::new(uploader, self.config.upload.clone());
        Ok(runner.run(&selected, args.dry_run).await)
    }

    fn clean(&self, args: &CleanArgs) -> Result<CleanReport> {
        Ok(clean_workspace(
            &self.config.paths.work_dir,
            &self.config.paths.output_dir,
            args.all,
        )?)
    }
}

fn check_path(name: &str, path: &Path, required: bool) -> HealthEntry {
    if path.exists() {
        HealthEntry::ok(name, format!("{}", path.display()))
    } else if required {
        HealthEntry::error(name, format!("{} missing", path.display()))
    } else {
        HealthEntry::warn(name, format!("{} missing", path.display()))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Ok, detail)
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Warn, detail)
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Error, detail)
    }

    fn with_status(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for entry in self {
            lines.push(format!(
                "[{status}] {name}: {detail}",
                status = entry.status,
                name = entry.name,
                detail = entry.detail
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for BatchReport {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for item in &self.items {
            let line = match &item.status {
                ItemStatus::Completed => format!(
                    "[done] {} -> {}",
                    item.source_id,
                    item.rendered
                        .as_deref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "-".to_string())
                ),
                ItemStatus::Failed { stage, reason } => {
                    format!("[fail] {} at {stage}: {reason}", item.source_id)
                }
            };
            lines.push(line);
        }
        for skipped in &self.skipped {
            lines.push(format!(
                "[skip] line {}: {} ({})",
                skipped.line, skipped.link, skipped.reason
            ));
        }
        let elapsed = self.finished_at - self.started_at;
        lines.push(format!(
            "{} completed, {} failed, {} skipped in {}s",
            self.completed(),
            self.failed(),
            self.skipped.len(),
            elapsed.num_seconds()
        ));
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<UploadRecord> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No rendered videos to upload".to_string();
        }
        self.iter()
            .map(|record| match &record.status {
                UploadStatus::Uploaded { video_id } => format!(
                    "[uploaded] {} -> https://www.youtube.com/watch?v={video_id}",
                    record.title
                ),
                UploadStatus::DryRun => format!("[dry-run] {}", record.path.display()),
                UploadStatus::Failed { reason } => {
                    format!("[failed] {}: {reason}", record.title)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for CleanReport {
    fn display(&self) -> String {
        if self.removed.is_empty() {
            return "Nothing to clean".to_string();
        }
        let mut lines: Vec<String> = self
            .removed
            .iter()
            .map(|path| format!("removed {}", path.display()))
            .collect();
        if !self.kept.is_empty() {
            lines.push(format!("{} not yet rendered, kept", self.kept.len()));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mozart_core::{ItemReport, SkippedLink, SourceId};
    use std::fs;
    use tempfile::TempDir;

    fn prepare_test_context() -> (TempDir, AppContext) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let config_path = root.join("mozart.toml");
        fs::copy("../configs/mozart.toml", &config_path).unwrap();

        let mut config = load_config(&config_path).unwrap();
        config.tools.ffmpeg = root.join("bin/ffmpeg");
        config.tools.ffprobe = None;
        config.tools.yt_dlp = root.join("bin/yt-dlp");
        config.paths.asset_video = root.join("assets/sample.mp4");
        config.paths.work_dir = root.join("files");
        config.paths.output_dir = root.join("output");
        config.paths.links_file = root.join("links.txt");
        config.upload.token_file = root.join("token.json");
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::write(&config.paths.asset_video, b"asset").unwrap();
        fs::write(&config.paths.links_file, "https://youtu.be/abc12345678\n").unwrap();

        (temp, AppContext::from_config(config_path, config))
    }

    #[test]
    fn cli_parses_subcommands_and_globals() {
        let cli = Cli::try_parse_from([
            "mozartctl",
            "--config",
            "custom.toml",
            "--format",
            "json",
            "upload",
            "--mode",
            "few",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(matches!(cli.format, OutputFormat::Json));
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.mode, UploadMode::Few);
                assert!(args.dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["mozartctl", "run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("mozart.toml"));
        assert!(matches!(cli.command, Commands::Run(RunArgs { links: None })));
    }

    #[test]
    fn upload_defaults_to_a_single_random_pick() {
        let cli = Cli::try_parse_from(["mozartctl", "upload"]).unwrap();
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(SelectionMode::from(args.mode), SelectionMode::One);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_check_flags_missing_tools() {
        let (_temp, context) = prepare_test_context();
        let report = context.health_check().await;

        let status_of = |name: &str| {
            report
                .iter()
                .find(|entry| entry.name == name)
                .map(|entry| entry.status.to_string())
        };
        assert_eq!(status_of("ffmpeg").as_deref(), Some("ERROR"));
        assert_eq!(status_of("yt-dlp").as_deref(), Some("ERROR"));
        assert_eq!(status_of("asset video").as_deref(), Some("OK"));
        assert_eq!(status_of("links file").as_deref(), Some("OK"));
        assert_eq!(status_of("token file").as_deref(), Some("WARN"));
        assert!(report.display().contains("[ERROR] ffprobe"));
    }

    #[tokio::test]
    async fn ensure_tools_is_fatal_when_binary_missing() {
        let (_temp, context) = prepare_test_context();
        let err = context.ensure_tools().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Tool(mozart_core::ToolError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn dry_run_upload_lists_rendered_videos() {
        let (_temp, context) = prepare_test_context();
        let item = context.config.paths.output_dir.join("abc12345678");
        fs::create_dir_all(&item).unwrap();
        fs::write(item.join("Song  1 Hour looped.mp4"), b"video").unwrap();

        let records = context
            .upload(&UploadArgs {
                mode: UploadMode::All,
                dry_run: true,
            })
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Song  1 Hour looped");
        assert!(records.display().starts_with("[dry-run]"));
    }

    #[test]
    fn clean_uses_configured_directories() {
        let (_temp, context) = prepare_test_context();
        let work = context.config.paths.work_dir.join("abc12345678");
        fs::create_dir_all(&work).unwrap();

        let report = context.clean(&CleanArgs { all: true }).unwrap();

        assert_eq!(report.removed, vec![work.clone()]);
        assert!(!work.exists());
        assert_eq!(report.display(), format!("removed {}", work.display()));
    }

    #[test]
    fn clean_error_keeps_the_offending_path() {
        let (_temp, context) = prepare_test_context();
        let work = context.config.paths.work_dir.clone();
        if work.exists() {
            fs::remove_dir_all(&work).unwrap();
        }
        fs::write(&work, b"").unwrap();

        let err = context.clean(&CleanArgs { all: false }).unwrap_err();

        assert!(matches!(err, AppError::Clean(_)));
        assert!(err.to_string().contains(&work.display().to_string()), "{err}");
    }

    #[test]
    fn batch_report_text_summarises_items() {
        let now = chrono::Utc::now();
        let report = BatchReport {
            started_at: now,
            finished_at: now,
            items: vec![ItemReport {
                source_id: SourceId::try_from("https://youtu.be/abc12345678").unwrap(),
                link: Some("https://youtu.be/abc12345678".into()),
                status: ItemStatus::Failed {
                    stage: mozart_core::Stage::Merge,
                    reason: "ffmpeg exited".into(),
                },
                title: None,
                rendered: None,
                thumbnail: None,
                stages: Vec::new(),
            }],
            skipped: vec![SkippedLink {
                line: 2,
                link: "nope".into(),
                reason: "no source identifier".into(),
            }],
        };

        let text = report.display();

        assert!(text.contains("[fail] abc12345678 at merge: ffmpeg exited"));
        assert!(text.contains("[skip] line 2: nope"));
        assert!(text.ends_with("0 completed, 1 failed, 1 skipped in 0s"));
    }
}
