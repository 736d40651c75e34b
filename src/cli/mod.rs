use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use sendlog::config::DEFAULT_CONFIG_PATH;

pub mod check;
pub mod run;

use check::CheckArgs;
use run::RunArgs;

#[derive(Parser, Debug)]
#[command(
    name = "sendlog",
    about = "Watch log files and route matching lines to alert channels",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file
    #[arg(long, short, global = true, env = "SENDLOG_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level override (e.g. error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor the configured files until Ctrl-C
    Run(RunArgs),

    /// Build the workflow trees, print them and exit
    Check(CheckArgs),
}

pub async fn execute(global: GlobalArgs, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => run::execute(args, &global).await,
        Commands::Check(args) => check::execute(args, &global),
    }
}

pub fn default_command() -> Commands {
    Commands::Run(RunArgs::default())
}
