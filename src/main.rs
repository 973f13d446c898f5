use std::path::PathBuf;

use budgetpilot::config::AppConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "budgetpilot", version, about = "Personal budget and ETF savings planner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the planner UI and JSON API
    Serve {
        /// TOML config file; built-in defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Bind address, an IP literal or a hostname
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,budgetpilot=debug".into()),
        ))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Serve { config, host, port } => {
            let mut config = AppConfig::load(config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            let market = budgetpilot::market::build_provider(&config.market)?;
            budgetpilot::api::run_http_server(&config, market).await?;
        }
    }
    Ok(())
}
