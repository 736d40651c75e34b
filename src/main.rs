use clap::Parser;

mod cli;

use cli::{Cli, default_command, execute};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(default_command);
    execute(cli.global, command).await
}
