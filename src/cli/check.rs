use clap::Args;

use super::GlobalArgs;
use sendlog::{
    app::{build_manager, load_config},
    logger::{LogConfig, init_tracing},
};

#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    /// Only report errors, do not print the trees
    #[arg(long, short)]
    pub quiet: bool,
}

pub fn execute(args: CheckArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let level = global.log_level.clone().unwrap_or_else(|| "warn".to_string());
    let _guard = init_tracing(&LogConfig::new(level, None))?;

    let handler = load_config(&global.config)?;
    let manager = build_manager(&handler)?;

    if !args.quiet {
        print!("{}", manager.render_trees());
    }
    println!(
        "✅ {} is valid: {} file(s), {} endpoint(s).",
        global.config.display(),
        manager.paths().len(),
        manager.destinations().len()
    );
    Ok(())
}
