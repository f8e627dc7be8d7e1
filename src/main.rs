use clap::Parser;
use tracing_subscriber::EnvFilter;

use acmeflow::cli::{Cli, Commands, commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Cert(args) => commands::cert::run(args).await,
        Commands::CreateAccountKey(args) => commands::account_key::run(args),
        Commands::Interactive(args) => commands::interactive::run(args).await,
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
