use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "postkeep")]
#[command(about = "postkeep - durable persistence for scrape sessions", long_about = None)]
struct Cli {
    /// Alternate config file (default: ~/.config/postkeep/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write a daily log file under <data_dir>/logs
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Addresses a stored session.
#[derive(Args)]
struct SessionArgs {
    /// Session id
    id: String,

    /// interactive-app or delegated-api
    #[arg(long, default_value = "interactive-app")]
    origin: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session, reading producer output from a JSONL file
    Run {
        /// profile, search, timeline or diagnostic
        #[arg(long)]
        kind: String,

        /// Username or query
        #[arg(long)]
        target: Option<String>,

        #[arg(long, default_value = "interactive-app")]
        origin: String,

        /// One raw record per line
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        desired_count: Option<usize>,

        /// Records per producer batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Print the committed records of a session as JSON
    Fetch(SessionArgs),
    /// List stored sessions
    Sessions,
    /// Delete a whole session
    Delete(SessionArgs),
    /// List retained staging snapshots
    Staging,
    /// Replay a retained staging snapshot into a new session
    Recover(SessionArgs),
    /// Normalize a metric string (e.g. "1.5K")
    Normalize { value: String },
}

/// Loads configuration and starts logging; held for the command's duration.
struct Invocation {
    ctx: commands::context::AppContext,
    _log_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

fn open_invocation(config: Option<PathBuf>, verbose: bool, log_file: bool) -> Result<Invocation> {
    let ctx = commands::context::AppContext::load(config)?;
    let log_guard = commands::logging::init(verbose, log_file.then(|| ctx.paths.logs_dir()))?;
    Ok(Invocation {
        ctx,
        _log_guard: log_guard,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        config,
        verbose,
        log_file,
        command,
    } = Cli::parse();
    let open = || open_invocation(config.clone(), verbose, log_file);

    match command {
        Commands::Run {
            kind,
            target,
            origin,
            input,
            desired_count,
            batch_size,
        } => {
            let invocation = open()?;
            let args = commands::run::RunArgs {
                kind,
                target,
                origin,
                input,
                desired_count,
                batch_size,
            };
            commands::run::run(&invocation.ctx, args).await?
        }
        Commands::Fetch(args) => {
            let invocation = open()?;
            commands::sessions::fetch(&invocation.ctx, &args.id, &args.origin).await?
        }
        Commands::Sessions => {
            let invocation = open()?;
            commands::sessions::list(&invocation.ctx).await?
        }
        Commands::Delete(args) => {
            let invocation = open()?;
            commands::sessions::delete(&invocation.ctx, &args.id, &args.origin).await?
        }
        Commands::Staging => {
            let invocation = open()?;
            commands::staging::list(&invocation.ctx).await?
        }
        Commands::Recover(args) => {
            let invocation = open()?;
            commands::staging::recover(&invocation.ctx, &args.id, &args.origin).await?
        }
        // needs neither configuration nor storage
        Commands::Normalize { value } => commands::normalize::run(&value),
    }

    Ok(())
}
