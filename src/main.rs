use clap::Parser;
use semantic_response_cache::cli::{self, Cli};
use semantic_response_cache::infrastructure::logging::init_logging;
use semantic_response_cache::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    cli::run(cli.command, &config).await
}
