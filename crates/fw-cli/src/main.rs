//! CLI entry point for the file-watch endpoint.
//!
//! This binary hosts a [`FileWatchEndpoint`] with a single consumer that
//! prints every delivered change to stdout, one line per event.
//!
//! # Usage
//!
//! ```bash
//! file-watch [OPTIONS] <COMMAND>
//!
//! # Print creations of CSV files anywhere under /data/inbox
//! file-watch watch --path /data/inbox --events CREATE --include '**/*.csv'
//!
//! # Stream JSON lines, four workers, bounded queue
//! file-watch watch --path /data/inbox --format json --concurrency 4 --queue-size 1024
//!
//! # Load options from a file and show the effective configuration
//! file-watch check --config watch.json
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use fw_core::{EventSet, WatchConfig};
use fw_watcher::{
    ChangeEvent, ConsumerHandle, FileWatchEndpoint, LoopState, LoopStatsSnapshot, PathMatcher,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// How often the host checks that the watch loop is still running.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watches a directory tree and reports created, modified and deleted
/// entries.
#[derive(Parser)]
#[command(name = "file-watch", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Directory to watch.
    ///
    /// Overrides `path` from `--config`.
    #[arg(short, long, global = true, env = "FILE_WATCH_PATH")]
    path: Option<Utf8PathBuf>,

    /// JSON configuration file.
    ///
    /// Command-line options override the values it contains.
    #[arg(short, long, global = true, env = "FILE_WATCH_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Comma-separated event kinds to report (CREATE, MODIFY, DELETE).
    #[arg(short, long, global = true)]
    events: Option<EventSet>,

    /// Glob matched against paths relative to the watched directory.
    #[arg(short, long, global = true)]
    include: Option<String>,

    /// Number of consumer threads.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Capacity of the event queue (unbounded if not set).
    #[arg(long, global = true)]
    queue_size: Option<usize>,

    /// Milliseconds an idle consumer waits before re-checking for shutdown.
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Fail instead of creating a missing watch directory.
    #[arg(long, global = true)]
    no_auto_create: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch the directory and print events until interrupted.
    Watch {
        /// Output format for events.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate the configuration and print it as JSON.
    Check,
}

/// Event output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `KIND path`, one per line.
    Text,
    /// One JSON object per line.
    Json,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Logs go to stderr so they never interleave with event output.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn,globset=warn,ignore=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds a [`WatchConfig`] from the optional config file and CLI overrides.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or the merged
/// configuration is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<WatchConfig> {
    let mut config = match &cli.config {
        Some(file) => WatchConfig::from_json_file(file)?,
        None => WatchConfig::default(),
    };

    if let Some(path) = &cli.path {
        config.path = path.clone();
    }
    if let Some(events) = cli.events {
        config.events = events;
    }
    if let Some(include) = &cli.include {
        config.include_pattern = include.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrent_consumers = concurrency;
    }
    if let Some(queue_size) = cli.queue_size {
        config.queue_size = Some(queue_size);
    }
    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        config.poll_interval_ms = poll_interval_ms;
    }
    if cli.no_auto_create {
        config.auto_create = false;
    }

    if config.path.as_str().trim().is_empty() {
        return Err(color_eyre::eyre::eyre!(
            "No directory to watch: pass --path or set \"path\" in --config"
        ));
    }
    config.validate()?;

    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Watches until Ctrl-C, SIGTERM, or a watch loop fault.
///
/// # Errors
///
/// Returns an error if the endpoint cannot start, or the fault that ended
/// the watch loop.
async fn run_watch(config: WatchConfig, format: OutputFormat) -> color_eyre::Result<()> {
    info!(
        path = %config.path,
        events = %config.events,
        include = %config.include_pattern,
        consumers = config.concurrent_consumers,
        "Starting file watch"
    );

    let mut endpoint = FileWatchEndpoint::new(config);
    let consumer = endpoint.add_consumer(move |event: &ChangeEvent| -> anyhow::Result<()> {
        let line = format_event(event, format)?;
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{line}")?;
        Ok(())
    })?;
    endpoint.start()?;

    let endpoint = Arc::new(endpoint);
    wait_for_shutdown(&endpoint).await?;

    let stopping = Arc::clone(&endpoint);
    let stopped = tokio::task::spawn_blocking(move || stopping.stop()).await?;

    print_stats_summary(&endpoint.loop_stats(), &consumer);
    stopped?;

    Ok(())
}

/// Resolves once a shutdown signal arrives or the watch loop stops on its own.
async fn wait_for_shutdown(endpoint: &FileWatchEndpoint) -> color_eyre::Result<()> {
    let signal = shutdown_signal();
    tokio::pin!(signal);

    let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        tokio::select! {
            result = &mut signal => {
                result?;
                return Ok(());
            }
            _ = health.tick() => {
                let state = endpoint.state();
                if state != LoopState::Running {
                    warn!(state = %state, "Watch loop is no longer running");
                    return Ok(());
                }
            }
        }
    }
}

/// Waits for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C, shutting down");
        Ok(())
    }
}

/// Validates the configuration, compiles its pattern, and prints it.
///
/// # Errors
///
/// Returns an error if the pattern does not compile or output fails.
fn run_check(config: &WatchConfig) -> color_eyre::Result<()> {
    PathMatcher::new(&config.include_pattern)?;

    let root = config.root();
    if root.is_dir() {
        info!(path = %root, "Watch directory exists");
    } else if root.exists() {
        warn!(path = %root, "Watch path exists but is not a directory");
    } else if config.auto_create {
        info!(path = %root, "Watch directory will be created on start");
    } else {
        warn!(path = %root, "Watch directory does not exist");
    }

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", serde_json::to_string_pretty(config)?)?;

    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Renders one event in the requested format.
fn format_event(event: &ChangeEvent, format: OutputFormat) -> anyhow::Result<String> {
    #[derive(serde::Serialize)]
    struct EventLine<'a> {
        kind: &'static str,
        path: &'a str,
        detected_at_ms: u64,
    }

    match format {
        OutputFormat::Text => Ok(format!("{} {}", event.kind, event.path)),
        OutputFormat::Json => {
            let detected_at_ms = event
                .detected_at
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| {
                    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
                });
            let line = EventLine {
                kind: event.kind.label(),
                path: event.path.as_str(),
                detected_at_ms,
            };
            Ok(serde_json::to_string(&line)?)
        }
    }
}

/// Prints loop and consumer counters to stderr.
fn print_stats_summary(watch: &LoopStatsSnapshot, consumer: &ConsumerHandle) {
    let stats = consumer.stats();
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();

    let _ = writeln!(handle);
    let _ = writeln!(handle, "File Watch Summary");
    let _ = writeln!(handle, "==================");
    let _ = writeln!(handle, "Events detected:     {}", watch.detected);
    let _ = writeln!(handle, "  Synthesized:       {}", watch.synthesized);
    let _ = writeln!(handle, "Directories added:   {}", watch.registered);
    let _ = writeln!(handle, "Notify errors:       {}", watch.notify_errors);
    let _ = writeln!(handle);
    let _ = writeln!(handle, "Consumer {}:", consumer.name());
    let _ = writeln!(handle, "  Delivered:         {}", stats.delivered);
    let _ = writeln!(handle, "  Failed:            {}", stats.failed);
    let _ = writeln!(handle, "  Filtered:          {}", stats.filtered);
    let _ = writeln!(handle, "  Dropped (full):    {}", stats.dropped);
    let _ = writeln!(handle, "  Discarded on stop: {}", stats.discarded);
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Merge config file and overrides
    let config = build_config(&cli)?;

    // 5. Route to appropriate command
    match cli.command {
        Commands::Watch { format } => run_watch(config, format).await,
        Commands::Check => run_check(&config),
    }
}
