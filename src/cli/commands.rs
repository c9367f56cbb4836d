//! CLI command definitions for repo-digest.
//!
//! Every command is a short-lived invocation against the shared store; the
//! `tick` command is what an external scheduler (cron, a platform timer)
//! runs periodically.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::TriggerAuth;
use crate::config::AppConfig;
use crate::export::{ArtifactSink, FsArtifactSink};
use crate::github::{GitHubClient, RepoCoordinate, RepoLister, RepoProvider};
use crate::ingest::{Enqueuer, FingerprintStore};
use crate::llm::{ChatClient, ContentGenerator, FileSummarizer, RateLimitedGenerator};
use crate::metrics;
use crate::scheduler::{GroupBarrier, JobStore, Scheduler};
use crate::storage::{KvStore, RedisStore, SharedRateLimiter};

/// Repository digest builder: enqueue, schedule and finalize per-file jobs.
#[derive(Parser)]
#[command(name = "repo-digest")]
#[command(about = "Fan a repository out into per-file jobs and assemble a digest artifact")]
#[command(version)]
#[command(
    long_about = "repo-digest ingests a GitHub repository into per-file jobs held in Redis, \
processes them in stateless scheduling passes and writes one combined artifact per group.\n\n\
Example usage:\n  repo-digest enqueue octo/demo\n  DIGEST_TICK_SECRET=... repo-digest tick"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL", global = true)]
    pub redis_url: Option<String>,

    /// Print Prometheus metrics for this invocation on exit.
    #[arg(long, global = true)]
    pub emit_metrics: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create one job per changed file of a repository.
    Enqueue(EnqueueArgs),

    /// Run one authenticated scheduling pass.
    Tick(TickArgs),

    /// Mirror a repository subtree into a local directory.
    Checkout(CheckoutArgs),

    /// Show the state of a group.
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
pub struct EnqueueArgs {
    /// Repository as `owner/repo`.
    pub repo: String,

    /// Only enqueue files under this path.
    #[arg(short = 'p', long)]
    pub path: Option<String>,

    /// Git ref to read (branch, tag or sha).
    #[arg(long = "ref")]
    pub git_ref: Option<String>,

    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct TickArgs {
    /// Shared secret presented by the trigger. Prefer the environment
    /// variable so the secret stays out of the process list.
    #[arg(long, env = "DIGEST_TICK_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Maximum jobs executed in this pass.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds after which an in-progress job is considered abandoned.
    #[arg(long)]
    pub stale_after_secs: Option<u64>,

    /// Directory finalized artifacts are written to.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct CheckoutArgs {
    /// Repository as `owner/repo`.
    pub repo: String,

    /// Destination directory.
    #[arg(short = 'o', long)]
    pub dest: PathBuf,

    /// Subtree to mirror; the whole repository when omitted.
    #[arg(short = 'p', long)]
    pub path: Option<String>,

    /// Git ref to read (branch, tag or sha).
    #[arg(long = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Group id returned by `enqueue`.
    pub group_id: Uuid,

    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(url) = cli.redis_url {
        config = config.with_redis_url(url);
    }

    if cli.emit_metrics {
        metrics::init_metrics().context("Failed to initialize metrics")?;
    }

    match cli.command {
        Commands::Enqueue(args) => run_enqueue_command(config, args).await?,
        Commands::Tick(args) => run_tick_command(config, args).await?,
        Commands::Checkout(args) => run_checkout_command(config, args).await?,
        Commands::Status(args) => run_status_command(config, args).await?,
    }

    if cli.emit_metrics {
        print!("{}", metrics::export_metrics());
    }
    Ok(())
}

fn parse_repo(raw: &str) -> anyhow::Result<RepoCoordinate> {
    RepoCoordinate::parse(raw)
        .ok_or_else(|| anyhow::anyhow!("Repository must be given as owner/repo, got '{}'", raw))
}

async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    Ok(Arc::new(store))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json);
    Ok(())
}

/// Builds the generator, spaced through the shared store when configured.
fn build_generator(config: &AppConfig, store: Arc<dyn KvStore>) -> Arc<dyn ContentGenerator> {
    if config.generation_api_key.is_none() {
        warn!("OPENROUTER_API_KEY is not set; generation requests will be unauthenticated");
    }
    let summarizer: Arc<dyn ContentGenerator> = Arc::new(FileSummarizer::new(
        ChatClient::from_config(config),
        &config.generation_model,
    ));
    if config.generation_min_interval.is_zero() {
        return summarizer;
    }
    let limiter = SharedRateLimiter::new(
        store,
        format!("{}:ratelimit:generation", config.key_prefix),
        config.generation_min_interval,
    );
    Arc::new(RateLimitedGenerator::new(summarizer, limiter))
}

async fn run_enqueue_command(mut config: AppConfig, args: EnqueueArgs) -> anyhow::Result<()> {
    let repo = parse_repo(&args.repo)?;
    if let Some(git_ref) = args.git_ref {
        config = config.with_git_ref(git_ref);
    }

    let store = connect_store(&config).await?;
    let provider: Arc<dyn RepoProvider> = Arc::new(GitHubClient::from_config(&config));
    let enqueuer = Enqueuer::new(
        provider,
        JobStore::new(store.clone(), &config.key_prefix),
        FingerprintStore::new(store, &config.key_prefix),
        config.traversal.clone(),
    );

    let report = enqueuer
        .enqueue(&repo, args.path.as_deref())
        .await
        .with_context(|| format!("Failed to enqueue {}", repo))?;

    if args.json {
        return print_json(&report);
    }
    println!("{}", report.group_id);
    info!(
        created = report.created,
        unchanged = report.unchanged,
        non_processable = report.non_processable,
        "Enqueue finished"
    );
    Ok(())
}

async fn run_tick_command(mut config: AppConfig, args: TickArgs) -> anyhow::Result<()> {
    // Reject before connecting to anything.
    let auth = TriggerAuth::new(config.trigger_secret.clone());
    auth.verify(args.secret.as_deref())?;

    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if let Some(secs) = args.stale_after_secs {
        config = config.with_stale_after(Duration::from_secs(secs));
    }
    if let Some(output) = args.output {
        config = config.with_artifact_dir(output);
    }
    config.validate()?;

    let store = connect_store(&config).await?;
    let provider: Arc<dyn RepoProvider> = Arc::new(GitHubClient::from_config(&config));
    let jobs = JobStore::new(store.clone(), &config.key_prefix);
    let sink: Arc<dyn ArtifactSink> = Arc::new(FsArtifactSink::new(&config.artifact_dir));
    let generator = build_generator(&config, store);

    let scheduler = {
        let owner = format!("tick-{}", Uuid::new_v4());
        let barrier = GroupBarrier::new(jobs.clone(), provider.clone(), sink, owner);
        Scheduler::new(jobs, provider, generator, barrier)
            .with_batch_size(config.batch_size)
            .with_stale_after(config.stale_after)
    };

    let report = scheduler.trigger(&auth, args.secret.as_deref()).await?;
    if args.json {
        return print_json(&report);
    }
    println!(
        "{} pass: {} selected, {} completed, {} failed, {} deferred, {} group(s) finalized",
        report.mode,
        report.selected,
        report.completed,
        report.failed,
        report.deferred,
        report.groups_finalized
    );
    Ok(())
}

async fn run_checkout_command(mut config: AppConfig, args: CheckoutArgs) -> anyhow::Result<()> {
    let repo = parse_repo(&args.repo)?;
    if let Some(git_ref) = args.git_ref {
        config = config.with_git_ref(git_ref);
    }

    let client = GitHubClient::from_config(&config);
    let lister = RepoLister::new(&client, config.traversal.clone());
    let written = lister
        .checkout(&repo, args.path.as_deref(), &args.dest)
        .await
        .with_context(|| format!("Failed to check out {}", repo))?;

    println!("{} file(s) written to {}", written, args.dest.display());
    Ok(())
}

async fn run_status_command(config: AppConfig, args: StatusArgs) -> anyhow::Result<()> {
    let store = connect_store(&config).await?;
    let jobs = JobStore::new(store, &config.key_prefix);
    let summary = jobs.group_summary(args.group_id).await?;

    if summary.record.is_none() && summary.total() == 0 {
        anyhow::bail!("Group {} not found", args.group_id);
    }
    if args.json {
        return print_json(&summary);
    }

    let status = summary
        .record
        .as_ref()
        .map(|r| r.status.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "group {}: {} ({} completed, {} queued, {} failed)",
        summary.group_id, status, summary.completed, summary.queued, summary.failed
    );
    if let Some(artifact) = summary.record.as_ref().and_then(|r| r.artifact.as_ref()) {
        println!("artifact: {}", artifact);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_enqueue_command() {
        let cli = Cli::try_parse_from(["repo-digest", "enqueue", "octo/demo", "-p", "src", "-j"])
            .expect("should parse");
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Enqueue(args) => {
                assert_eq!(args.repo, "octo/demo");
                assert_eq!(args.path.as_deref(), Some("src"));
                assert!(args.git_ref.is_none());
                assert!(args.json);
            }
            _ => panic!("Expected Enqueue command"),
        }
    }

    #[test]
    fn test_tick_command_with_options() {
        let cli = Cli::try_parse_from([
            "repo-digest",
            "--log-level",
            "debug",
            "tick",
            "--secret",
            "s3cret",
            "--batch-size",
            "10",
            "--stale-after-secs",
            "120",
            "-o",
            "./out",
        ])
        .expect("should parse");
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Tick(args) => {
                assert_eq!(args.secret.as_deref(), Some("s3cret"));
                assert_eq!(args.batch_size, Some(10));
                assert_eq!(args.stale_after_secs, Some(120));
                assert_eq!(args.output, Some(PathBuf::from("./out")));
                assert!(!args.json);
            }
            _ => panic!("Expected Tick command"),
        }
    }

    #[test]
    fn test_tick_secret_from_env() {
        std::env::set_var("DIGEST_TICK_SECRET", "from-env");
        let cli = Cli::try_parse_from(["repo-digest", "tick"]).expect("should parse");
        std::env::remove_var("DIGEST_TICK_SECRET");
        match cli.command {
            Commands::Tick(args) => assert_eq!(args.secret.as_deref(), Some("from-env")),
            _ => panic!("Expected Tick command"),
        }
    }

    #[test]
    fn test_checkout_requires_dest() {
        assert!(Cli::try_parse_from(["repo-digest", "checkout", "octo/demo"]).is_err());
        let cli = Cli::try_parse_from([
            "repo-digest",
            "checkout",
            "octo/demo",
            "--dest",
            "/tmp/mirror",
            "--ref",
            "v1.0",
        ])
        .expect("should parse");
        match cli.command {
            Commands::Checkout(args) => {
                assert_eq!(args.dest, PathBuf::from("/tmp/mirror"));
                assert_eq!(args.git_ref.as_deref(), Some("v1.0"));
            }
            _ => panic!("Expected Checkout command"),
        }
    }

    #[test]
    fn test_status_requires_uuid() {
        assert!(Cli::try_parse_from(["repo-digest", "status", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4();
        let raw = id.to_string();
        let cli = Cli::try_parse_from(["repo-digest", "status", raw.as_str()])
            .expect("should parse");
        match cli.command {
            Commands::Status(args) => assert_eq!(args.group_id, id),
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_parse_repo() {
        assert_eq!(parse_repo("octo/demo").unwrap().full_name(), "octo/demo");
        assert!(parse_repo("octo").is_err());
    }
}
