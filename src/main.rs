use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tarm::queue::JobQueue;
use tarm::{Engine, EngineConfig, Operation, ProviderRequest, VERSION};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Resource lifecycle and dispatch engine
#[derive(Parser, Debug)]
#[command(name = "tarm", version = VERSION, about, long_about = None)]
struct Args {
    /// Config file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Number of workers (overrides the config file)
    #[arg(short, long)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process newline-delimited JSON job requests and print each result
    Run {
        /// Read requests from a file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// How long to wait for each result; 0 prints the pending handle
        #[arg(long, default_value_t = 5000)]
        wait_ms: u64,
    },
    /// Show queue statistics from the journal
    Stats,
    /// List dead-lettered jobs from the journal
    DeadLetters,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// One line of `run` input
#[derive(Debug, Deserialize)]
struct JobRequestLine {
    provider_namespace: String,
    resource_type: String,
    operation: Operation,
    #[serde(default)]
    request: ProviderRequest,
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("tarm {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("tarm").join("tarm.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".tarm").join("tarm.log");
    }
    PathBuf::from("tarm.log")
}

/// Effective config (CLI > config file > defaults)
fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    if let Some(workers) = args.workers {
        config.worker.count = workers;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;
    let config = load_config(&args)?;

    match args.command {
        Command::Run { input, wait_ms } => {
            let wait = Duration::from_millis(wait_ms);
            match input {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Failed to open input {}", path.display()))?;
                    run(config, file, wait).await
                }
                None => run(config, tokio::io::stdin(), wait).await,
            }
        }
        Command::Stats => {
            let queue = open_journal(&config).await?;
            println!("{}", serde_json::to_string_pretty(&queue.get_queue_stats().await)?);
            Ok(())
        }
        Command::DeadLetters => {
            let queue = open_journal(&config).await?;
            println!("{}", serde_json::to_string_pretty(&queue.dead_letters().await)?);
            Ok(())
        }
    }
}

async fn open_journal(config: &EngineConfig) -> Result<JobQueue> {
    if config.queue.journal_path.is_none() {
        eprintln!("No queue journal configured (queue.journal_path); the queue is in-memory.");
    }
    JobQueue::open(config.queue.clone())
        .await
        .context("Failed to open job queue")
}

async fn run<R>(config: EngineConfig, input: R, wait: Duration) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut engine = Engine::build(config)
        .await
        .context("Failed to start engine")?;
    engine.start_workers();

    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<JobRequestLine>(line) {
            Ok(req) => {
                let result = engine
                    .offload()
                    .dispatch_and_wait(
                        &req.provider_namespace,
                        &req.resource_type,
                        req.operation,
                        req.request,
                        wait,
                    )
                    .await?;
                serde_json::to_string(&result)?
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected input line");
                serde_json::to_string(&serde_json::json!({
                    "status": "rejected",
                    "error": format!("invalid job request: {}", e),
                }))?
            }
        };
        println!("{}", output);
    }

    engine.shutdown().await;
    print_summary(&engine).await;
    Ok(())
}

async fn print_summary(engine: &Engine) {
    let status = engine.worker_status();
    let dead = engine.queue().dead_letters().await.len();
    eprintln!(
        "workers: {} | processed: {} | failed deliveries: {} | dead letters: {}",
        status.total_workers, status.jobs_processed, status.jobs_failed, dead
    );
    for job in engine.queue().recent_jobs(10).await {
        eprintln!("  {}", job.summary());
    }
}
