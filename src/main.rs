use claude_pipe::app::{handle_fatal_error, init_logging, run_server, run_tail, AppConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tail Claude session logs and pipe them to subscribers
#[derive(Parser)]
#[command(name = "claude-pipe", version)]
#[command(about = "Tail Claude session logs, drive Claude workers, and fan events out to subscribers", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file (JSON, or TOML with a .toml extension)
    #[arg(short = 'c', long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default command)
    Serve {
        /// Port to listen on, overriding the configuration
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print records appended under the watch directory as JSON lines
    Tail {
        /// Directory to watch instead of the configured one
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let app = AppConfig::new(cli.verbose).with_config_path(cli.config);
    init_logging(&app);

    let result = match cli.command {
        Some(Commands::Serve { port }) => run_server(&app, port).await,
        Some(Commands::Tail { dir }) => run_tail(&app, dir).await,
        None => run_server(&app, None).await,
    };

    if let Err(e) = result {
        handle_fatal_error(e, app.verbose);
    }
}
