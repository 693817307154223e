mod aggregator;
mod backend;
mod collector;
mod config;
mod correlator;
mod framing;
mod process;
mod resolver;
mod tokenizer;

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncRead;
use anyhow::{Context, Result};
use clap::Parser;
use shared::protocol::HOST_NAME;
use shared::types::ResultEnvelope;
use crate::config::Config;
use crate::framing::{Command, OutputMode};

const LOG_FILE: &str = "zeroconf_lookup.log";

/// How long to wait for the browser to send its command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Find HTTP servers in the .local domain using Zeroconf.
///
/// Runs as a native-messaging host: reads one length-prefixed command from
/// stdin and answers with one length-prefixed JSON result on stdout.
#[derive(Debug, Parser)]
#[command(name = "zeroconf_lookup", version)]
struct Args {
    /// Print the result with a readable length banner and do not read stdin
    #[arg(short, long)]
    readable: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Browse window in seconds
    #[arg(short, long, value_name = "SECS")]
    wait: Option<u64>,

    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log destination: a file path, "stderr" or "none"
    #[arg(short, long, value_name = "SINK")]
    log: Option<String>,

    /// Arguments added by the browser (extension origin, window handle)
    #[arg(hide = true)]
    browser_args: Vec<String>,
}

fn init_logging(args: &Args) -> Result<()> {
    let default_filter = if args.verbose {
        "zeroconf_lookup=debug"
    } else {
        "zeroconf_lookup=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // stdout carries the framed result, logs go anywhere else
    match args.log.as_deref() {
        Some("none") => {}
        Some("stderr") => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        sink => {
            let path = sink
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE));
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
    }

    Ok(())
}

/// Wait up to `limit` for the browser's command and log what arrived.
async fn receive_command<R: AsyncRead + Unpin>(input: &mut R, limit: Duration) -> Option<Command> {
    match tokio::time::timeout(limit, framing::read_command(input)).await {
        Ok(Ok(Some(command))) => {
            match &command {
                Command::Lookup => tracing::info!("Received Lookup"),
                Command::Unrecognized(text) => tracing::warn!("unknown command {:?}", text),
            }
            Some(command)
        }
        Ok(Ok(None)) => {
            tracing::info!("no input");
            None
        }
        Ok(Err(e)) => {
            tracing::warn!("Failed to read command: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("No command within {:?}", limit);
            None
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    tracing::info!("Starting {} {}", HOST_NAME, env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the tokio runtime")?;
    let result = runtime.block_on(run(args));
    // A stdin read abandoned at the command timeout must not hold up exit
    runtime.shutdown_background();
    result
}

async fn run(args: Args) -> Result<()> {
    let config = Config::resolve(args.config.as_deref(), args.wait)?;
    tracing::debug!("readable ........: {}", args.readable);
    tracing::debug!("timeout .........: {}s", config.timeout_secs);
    tracing::debug!("service type ....: {}", config.service_type);
    tracing::debug!("log sink ........: {}", args.log.as_deref().unwrap_or(LOG_FILE));
    if !args.browser_args.is_empty() {
        tracing::debug!("browser args ....: {:?}", args.browser_args);
    }

    let mode = if args.readable {
        OutputMode::Readable
    } else {
        OutputMode::Binary
    };

    // The command only gates logging; collection always runs
    if mode == OutputMode::Binary {
        receive_command(&mut tokio::io::stdin(), COMMAND_TIMEOUT).await;
    }

    let backend = match backend::select(&config) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!("No discovery backend available: {:#}", e);
            return Err(e);
        }
    };

    let servers = collector::collect(backend.as_ref(), &config).await;
    let envelope = ResultEnvelope::new(backend.source(), servers);

    let mut stdout = tokio::io::stdout();
    framing::write_envelope(&mut stdout, &envelope, mode)
        .await
        .context("Failed to write result")?;

    tracing::info!(
        "Sent {} servers from {}",
        envelope.result.len(),
        envelope.source
    );
    Ok(())
}
