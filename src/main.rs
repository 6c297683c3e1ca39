use clap::Parser;
use pmp_access_control::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Keys(command) => cli::keys::run(command).await,
        Command::Usage(command) => cli::usage::run(command).await,
        Command::Status => cli::status::run().await,
    }
}
