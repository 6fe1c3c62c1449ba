//! ctxtail - live log tailing with grep-style context.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures_util::{Stream, StreamExt};
use regex::Regex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ctxtail::config::{ConfigError, ConfigLoader, TailConfig};
use ctxtail::context::{ContextBundle, ContextExtractor, TimestampSniffer};
use ctxtail::display::{self, OutputMode};
use ctxtail::tail::{FileTailer, NotifyWatcher, TailError};

#[derive(Parser)]
#[command(
    name = "ctxtail",
    about = "Live log tailing with grep-style context",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a config file (default: .ctxtail.toml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every matching line of a file with its context, then exit.
    Read(ContextArgs),
    /// Print matching lines with context, then keep following the file.
    Follow {
        #[command(flatten)]
        context: ContextArgs,
        /// Fallback poll interval in seconds (0 disables polling).
        #[arg(long)]
        poll: Option<u64>,
    },
    /// Print the file's numbered lines, then keep following it.
    Lines {
        /// File to tail.
        file: PathBuf,
        /// Fallback poll interval in seconds (0 disables polling).
        #[arg(long)]
        poll: Option<u64>,
        /// Write one JSON object per line.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ContextArgs {
    /// File to read.
    file: PathBuf,
    /// Lines of context before each match.
    #[arg(short = 'B', long)]
    before: Option<usize>,
    /// Lines of context after each match.
    #[arg(short = 'A', long)]
    after: Option<usize>,
    /// Only show lines matching this regular expression.
    #[arg(short = 'e', long)]
    regexp: Option<String>,
    /// Write one JSON object per match.
    #[arg(long)]
    json: bool,
    /// Prefix each match with a timestamp recovered from its context.
    #[arg(long)]
    timestamps: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tail(#[from] TailError),
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Context of {before} lines before and {after} after is too large")]
    ContextSize { before: usize, after: usize },
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn output_mode(json: bool) -> OutputMode {
    if json {
        OutputMode::Json
    } else {
        OutputMode::Text {
            color: std::io::stdout().is_terminal(),
        }
    }
}

fn build_extractor(args: &ContextArgs, config: &TailConfig) -> Result<ContextExtractor, CliError> {
    let before = args.before.unwrap_or(config.preceding);
    let after = args.after.unwrap_or(config.following);
    let extractor =
        ContextExtractor::checked(before, after).ok_or(CliError::ContextSize { before, after })?;
    Ok(match &args.regexp {
        Some(pattern) => extractor.with_pattern(Regex::new(pattern)?),
        None => extractor,
    })
}

fn build_tailer(file: PathBuf, config: &TailConfig, poll: Option<u64>) -> FileTailer {
    let mut options = config.tail_options();
    if let Some(secs) = poll {
        options.poll_interval = Duration::from_secs(secs);
    }
    let watcher = Arc::new(NotifyWatcher::new(config.debounce()));
    FileTailer::new(file, watcher, options)
}

fn print_match(
    bundle: &ContextBundle,
    sniffer: Option<&TimestampSniffer>,
    mode: OutputMode,
) -> Result<(), CliError> {
    let timestamp = sniffer.and_then(|s| s.sniff(bundle));
    display::print_bundle(bundle, timestamp, mode)?;
    Ok(())
}

/// Drain `stream` until it ends or Ctrl-C is pressed.
async fn until_interrupted<S, T>(
    stream: S,
    mut handle: impl FnMut(T) -> Result<(), CliError>,
) -> Result<(), CliError>
where
    S: Stream<Item = Result<T, TailError>>,
{
    let mut stream = std::pin::pin!(stream);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                return Ok(());
            }
            item = stream.next() => match item {
                Some(Ok(value)) => handle(value)?,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let loader = cli.config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let config = loader.load()?;
    tracing::debug!(?config, source = ?loader.find_config_file(), "Effective config");

    match cli.command {
        Commands::Read(args) => {
            let extractor = build_extractor(&args, &config)?;
            let sniffer = args.timestamps.then(TimestampSniffer::new);
            let mode = output_mode(args.json);
            for bundle in extractor.read_file(&args.file)? {
                print_match(&bundle, sniffer.as_ref(), mode)?;
            }
            Ok(())
        }
        Commands::Follow { context, poll } => {
            let extractor = build_extractor(&context, &config)?;
            let sniffer = context.timestamps.then(TimestampSniffer::new);
            let mode = output_mode(context.json);
            let tailer = build_tailer(context.file.clone(), &config, poll);
            tracing::info!(
                path = %tailer.path().display(),
                preceding = extractor.preceding(),
                following = extractor.following(),
                "Following file"
            );
            until_interrupted(extractor.follow(&tailer), |bundle| {
                print_match(&bundle, sniffer.as_ref(), mode)
            })
            .await
        }
        Commands::Lines { file, poll, json } => {
            let mode = output_mode(json);
            let tailer = build_tailer(file, &config, poll);
            tracing::info!(path = %tailer.path().display(), "Tailing file");
            until_interrupted(tailer.subscribe(), |line| {
                display::print_line(&line, mode)?;
                Ok(())
            })
            .await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "ctxtail failed");
        eprintln!("ctxtail: {e}");
        std::process::exit(1);
    }
}
