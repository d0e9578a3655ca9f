//! CLI for the chat archive.
//!
//! Subcommands:
//!  - `extract`    : pull chats from LiveChat into `<output>/originals` and
//!                   `<output>/transcript`, replicating each file to S3.
//!  - `transcribe` : regenerate every transcript from the raw files already on disk.
//!
//! Credentials come from `LIVECHAT_LOGIN` / `LIVECHAT_API_KEY` (a `.env` file in
//! the working directory is honoured). AWS credentials use the default chain.
//!
//! Usage examples:
//!  cargo run -p chat-archive -- extract --from 2018-01-01 --to 2018-01-31 --bucket my-chats
//!  cargo run -p chat-archive -- extract --no-upload --json
//!  cargo run -p chat-archive -- transcribe --output ./files

mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_archive::{
    rebuild_transcripts, ArtifactWriter, ConcurrencyBudget, Credentials, DateScope,
    LiveChatClient, NoopSink, Pipeline, PipelineConfig, RetryPolicy, UploadSink, UploadTarget,
};

use crate::progress::ExtractionProgress;

/// CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "chat-archive",
    about = "Archive LiveChat conversations to local files and S3",
    version
)]
struct Cli {
    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract chats, write raw JSON and transcripts, and upload both.
    Extract(ExtractArgs),

    /// Rebuild all transcripts from `originals/` without touching the network.
    Transcribe(TranscribeArgs),
}

/// Arguments for the `extract` subcommand.
#[derive(Args, Debug)]
struct ExtractArgs {
    /// First day to extract (YYYY-MM-DD, inclusive). Alone, extracts only that day.
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    from: Option<NaiveDate>,

    /// Last day to extract (YYYY-MM-DD, inclusive). Alone, extracts only that day.
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    to: Option<NaiveDate>,

    /// Output root holding `originals/` and `transcript/`.
    #[arg(long, short = 'o', value_name = "PATH", default_value = "./files")]
    output: PathBuf,

    /// LiveChat account login.
    #[arg(long, env = "LIVECHAT_LOGIN", hide_env_values = true)]
    login: Option<String>,

    /// LiveChat API key.
    #[arg(long, env = "LIVECHAT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Override the LiveChat API base URL.
    #[arg(long, env = "LIVECHAT_API_URL", hide = true)]
    api_url: Option<String>,

    /// S3 bucket receiving every artifact.
    #[arg(long, env = "CHAT_ARCHIVE_BUCKET")]
    bucket: Option<String>,

    /// S3 region.
    #[arg(long, env = "CHAT_ARCHIVE_REGION", default_value = "eu-west-1")]
    region: String,

    /// Key prefix inside the bucket.
    #[arg(long, default_value = "")]
    prefix: String,

    /// Concurrent page listings.
    #[arg(long, default_value_t = chat_archive::config::DEFAULT_PAGE_CONCURRENCY)]
    page_concurrency: usize,

    /// Concurrent record fetch/write workers.
    #[arg(long, default_value_t = chat_archive::config::DEFAULT_RECORD_CONCURRENCY)]
    record_concurrency: usize,

    /// Concurrent uploads.
    #[arg(long, default_value_t = chat_archive::config::DEFAULT_UPLOAD_CONCURRENCY)]
    upload_concurrency: usize,

    /// Retries for throttled or failed API requests (0 aborts on the first failure).
    #[arg(long, default_value_t = RetryPolicy::default().max_retries)]
    max_retries: u32,

    /// Write files locally only; skip S3 replication.
    #[arg(long)]
    no_upload: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `transcribe` subcommand.
#[derive(Args, Debug)]
struct TranscribeArgs {
    /// Output root holding `originals/` and `transcript/`.
    #[arg(long, short = 'o', value_name = "PATH", default_value = "./files")]
    output: PathBuf,

    /// Print the rebuild summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load `.env` before clap reads env-backed flags.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract(args) => run_extract(args).await,
        Commands::Transcribe(args) => run_transcribe(args).await,
    }
}

impl ExtractArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            output_root: self.output.clone(),
            concurrency: ConcurrencyBudget {
                pages: self.page_concurrency,
                records: self.record_concurrency,
                uploads: self.upload_concurrency,
            },
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
            upload: UploadTarget {
                bucket: self.bucket.clone().unwrap_or_default(),
                region: self.region.clone(),
                prefix: self.prefix.clone(),
            },
        }
    }
}

/// Pick the upload backend for this run.
async fn build_sink(args: &ExtractArgs, target: &UploadTarget) -> Result<Arc<dyn UploadSink>> {
    if args.no_upload {
        tracing::info!("Uploads disabled, writing locally only");
        return Ok(Arc::new(NoopSink));
    }

    #[cfg(feature = "s3")]
    {
        let sink = chat_archive::S3Sink::from_target(target)
            .await
            .context("configuring S3 upload sink (pass --bucket or --no-upload)")?;
        Ok(Arc::new(sink))
    }

    #[cfg(not(feature = "s3"))]
    {
        let _ = target;
        bail!("S3 support is not enabled. Rebuild with '--features s3' or pass --no-upload.");
    }
}

/// Run the `extract` subcommand.
///
/// # Errors
///
/// Fails before any work starts on missing credentials, a reversed date range
/// or an unusable upload target; fails afterwards with the first fatal error
/// any worker hit.
async fn run_extract(args: ExtractArgs) -> Result<()> {
    let credentials = Credentials::from_parts(args.login.clone(), args.api_key.clone())?;
    let scope = DateScope::from_bounds(args.from, args.to).context("invalid --from/--to")?;
    let config = args.pipeline_config();
    config.validate()?;

    let remote = match &args.api_url {
        Some(url) => LiveChatClient::with_base_url(credentials, config.retry, url.as_str())?,
        None => LiveChatClient::new(credentials, config.retry)?,
    };
    let sink = build_sink(&args, &config.upload).await?;

    tracing::info!(
        output = %config.output_root.display(),
        scope = ?scope,
        bucket = %config.upload.bucket,
        "Starting extract"
    );

    let progress = ExtractionProgress::new(!args.json);
    let mut pipeline = Pipeline::new(config, Arc::new(remote), sink)?;
    if let Some(callback) = progress.callback() {
        pipeline = pipeline.with_progress(callback);
    }

    let result = pipeline.run(scope).await;
    progress.finish();
    let summary = result.context("extraction aborted")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Extract complete: {}", summary.summary());
    }
    Ok(())
}

/// Run the `transcribe` subcommand.
async fn run_transcribe(args: TranscribeArgs) -> Result<()> {
    let writer = ArtifactWriter::new(args.output.clone());
    if !writer.originals_dir().is_dir() {
        bail!(
            "no raw artifacts found under {}",
            writer.originals_dir().display()
        );
    }

    let summary = rebuild_transcripts(&writer)
        .await
        .with_context(|| format!("rebuilding transcripts under {}", args.output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Rebuilt {} transcripts ({} lines) under {}",
            summary.transcripts,
            summary.lines,
            writer.transcript_root().display()
        );
    }
    Ok(())
}
