use anyhow::Result;
use clap::{Parser, Subcommand};
use llm_router::cli::{self, OutputMode};
use llm_router::config::RouterConfig;
use llm_router::logging;
use llm_router::router::Router;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "llm-router")]
#[command(about = "Route chat prompts across free-tier LLM providers with sticky failover")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory for .llm-router/config.toml (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Write logs to a timestamped file under the config directory
    #[arg(long, global = true, conflicts_with = "log_file")]
    log: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt and print the answer
    Ask {
        /// System instruction placed before the prompt
        #[arg(long)]
        system: Option<String>,

        /// Emit JSON events instead of text
        #[arg(long)]
        json: bool,

        /// Prompt text
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
    },

    /// Show provider health and the sticky provider
    Status {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List known providers and whether their credentials are set
    Backends,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RouterConfig::load(cli.dir.as_deref())?;

    let log_file = if cli.log {
        Some(logging::default_log_path()?)
    } else {
        cli.log_file.clone().or_else(|| config.router.log_path())
    };
    let guard = logging::init_logging(cli.debug, cli.quiet, log_file)?;

    // Registry bootstrap is deferred until the first call or status read
    let router = Arc::new(Router::from_env(config.clone()));

    let code = match cli.command {
        Commands::Ask {
            system,
            json,
            prompt,
        } => {
            let handler = cli::create_handler(OutputMode::from_flags(json, cli.quiet), cli.debug);
            let messages = cli::build_messages(system.as_deref(), &prompt);
            cli::ask(&router, &messages, &*handler).await
        }

        Commands::Status { json } => {
            let handler = cli::create_handler(OutputMode::from_flags(json, cli.quiet), cli.debug);
            cli::status(&router, &*handler)
        }

        Commands::Backends => {
            let handler = cli::create_handler(OutputMode::from_flags(false, cli.quiet), cli.debug);
            cli::list_backends(&config, |var| std::env::var(var).ok(), &*handler);
            0
        }
    };

    if code != 0 {
        drop(guard);
        std::process::exit(code);
    }

    Ok(())
}
