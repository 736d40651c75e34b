pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod message;
pub mod plugin;
pub mod record;
pub mod util;
pub mod watcher;
pub mod workflow;
