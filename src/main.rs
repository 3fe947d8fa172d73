use clap::Parser;
use mealplan_core::PlannerResult;
use mealplan_core::config::{self, Config};
use mealplan_core::server::start_server;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

/// Multi-tenant recipe and meal-planning server.
///
/// Expects an authenticating proxy in front of it that sets the
/// `x-user-id` / `x-user-email` headers on every request.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Port to listen on (overrides MEALPLAN_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite connection URL (overrides MEALPLAN_DATABASE)
    #[arg(long)]
    database: Option<String>,

    /// Backup document imported into every new library (overrides MEALPLAN_SEED)
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> PlannerResult<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).init();

    let mut config = Config::load();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_url = database;
    }
    if args.seed.is_some() {
        config.seed_path = args.seed;
    }

    std::fs::create_dir_all(config::data_dir())?;
    start_server(config).await
}
