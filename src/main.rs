mod cli;
mod runner;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    runner::run_from_cli(cli).await
}
