use clap::Args;
use tracing::info;

use super::GlobalArgs;
use sendlog::{
    app::{App, load_config},
    logger::init_tracing,
};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Override `queue_capacity` from the configuration (0 = unbounded)
    #[arg(long)]
    pub queue_capacity: Option<usize>,
}

pub async fn execute(args: RunArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let handler = load_config(&global.config)?;

    let mut log_config = handler.log_config();
    if let Some(level) = &global.log_level {
        log_config.log_level = level.clone();
    }
    let _guard = init_tracing(&log_config)?;
    info!(config = %global.config.display(), "sendlog starting up");

    let mut app = App::bootstrap(&handler)?;
    if let Some(capacity) = args.queue_capacity {
        app = app.with_queue_capacity(capacity);
    }
    print!("{}", app.forest().render());
    println!("sendlog running; press Ctrl-C to exit");

    let processed = app.run().await?;
    info!(processed, "sendlog shut down");
    println!("Goodbye!");
    Ok(())
}
