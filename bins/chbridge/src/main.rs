mod cmd;

use clap::{Args, Parser, Subcommand};

use chbridge_engine::BridgeConfig;

#[derive(Parser)]
#[command(name = "chbridge", about = "Columnar/row codec between the analytical store and the row engine")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, global = true, env = "CHBRIDGE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the external type each wire type is read as
    Describe(DescribeArgs),
    /// Insert a JSON fixture into the in-memory transport and read it back
    Replay(ReplayArgs),
}

#[derive(Args, Clone, Debug)]
pub struct DescribeArgs {
    /// Wire type names, e.g. 'Nullable(Array(UInt16))'
    #[arg(required = true)]
    pub types: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// Fixture file: {"columns": [{"name", "type"}], "batches": [[row, ...], ...]}
    pub fixture: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            tracing::info!(config = %path, "loading configuration");
            match BridgeConfig::load(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load config");
                    std::process::exit(1);
                }
            }
        }
        None => BridgeConfig::default(),
    };

    let result = match &cli.command {
        Commands::Describe(args) => cmd::describe::run(args),
        Commands::Replay(args) => cmd::replay::run(config, args).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
