// src/app.rs
use std::{future::Future, path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use tracing::{error, info};

use crate::{
    config::{ConfigHandler, SendlogConfig},
    dispatch::{Dispatcher, LineSink},
    error::{ConfigError, WorkflowError},
    plugin::{PluginRegistry, declarative},
    watcher::LogMonitor,
    workflow::{WorkflowForest, WorkflowManager},
};

/// Read the configuration file. The error is logged with its code, and
/// the code also leads the returned message since tracing may not be
/// initialised yet.
pub fn load_config(path: &Path) -> Result<ConfigHandler> {
    ConfigHandler::load(path)
        .inspect_err(ConfigError::log)
        .map_err(|e| {
            let code = e.code();
            anyhow::Error::new(e).context(format!(
                "[{code}] could not load configuration from {}",
                path.display()
            ))
        })
}

/// Built-in modules plus the declarative formats under `plugin_dir`.
pub fn build_registry(config: &SendlogConfig) -> Result<PluginRegistry, WorkflowError> {
    let registry = PluginRegistry::with_builtins();
    if let Some(dir) = &config.plugin_dir {
        let loaded = declarative::load_dir(&registry, dir)?;
        info!(dir = %dir.display(), modules = loaded, "declarative plugins loaded");
    }
    Ok(registry)
}

/// Register every endpoint, then merge every workflow row, in document
/// order. The first failure is logged with its code and returned.
pub fn build_manager(handler: &ConfigHandler) -> Result<WorkflowManager> {
    let registry = build_registry(handler.config()).inspect_err(WorkflowError::log)?;
    let mut manager = WorkflowManager::new(Arc::new(registry));

    for row in handler.endpoints().inspect_err(ConfigError::log)? {
        manager
            .load_endpoint(&row.plugin, &row.channel, &row.endpoint, row.vars)
            .inspect_err(WorkflowError::log)?;
    }
    for row in handler.files() {
        manager
            .load_file(
                &row.path,
                &row.plugin,
                &row.log_type,
                &row.rule,
                &row.transform,
                &row.endpoint,
            )
            .inspect_err(WorkflowError::log)?;
    }
    info!(
        files = manager.paths().len(),
        destinations = manager.destinations().len(),
        "workflow trees built"
    );
    Ok(manager)
}

pub struct App {
    forest: Arc<WorkflowForest>,
    queue_capacity: Option<usize>,
    poll_interval: Duration,
}

impl App {
    pub fn bootstrap(handler: &ConfigHandler) -> Result<Self> {
        let manager = build_manager(handler)?;
        let config = handler.config();
        Ok(Self {
            forest: Arc::new(manager.into_forest()),
            queue_capacity: config.queue_capacity,
            poll_interval: Duration::from_millis(config.rescan_interval_ms.max(1)),
        })
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn forest(&self) -> &WorkflowForest {
        &self.forest
    }

    /// Monitor until Ctrl-C.
    pub async fn run(self) -> Result<usize> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "could not listen for Ctrl-C");
            }
        })
        .await
    }

    /// Monitor until `shutdown` completes, then drain the queue. Returns the
    /// number of lines processed.
    pub async fn run_until<F>(self, shutdown: F) -> Result<usize>
    where
        F: Future<Output = ()>,
    {
        let (dispatcher, handle) = Dispatcher::spawn(self.forest.clone(), self.queue_capacity);
        let monitor = LogMonitor::new(self.forest.paths(), self.poll_interval);
        let sink: Arc<dyn LineSink> = Arc::new(handle);

        info!(files = self.forest.len(), "sendlog running");
        let outcome = tokio::select! {
            res = monitor.run(sink.clone()) => res,
            _ = shutdown => {
                info!("shutdown requested");
                Ok(())
            }
        };
        drop(sink);

        let processed = dispatcher.shutdown().await?;
        outcome.inspect_err(|e| error!(error = %e, "log monitor stopped"))?;
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_config_file_keeps_its_code() {
        let dir = tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.yml")).err().unwrap();
        assert!(err.to_string().starts_with("[CONFIG.IO] could not load configuration"));
        assert_eq!(err.downcast_ref::<ConfigError>().map(ConfigError::code), Some("CONFIG.IO"));
    }

    #[test]
    fn unparsable_config_keeps_its_code() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sendlog.yml");
        fs::write(&path, "endpoints: [unclosed\n").unwrap();
        let err = load_config(&path).err().unwrap();
        assert!(err.to_string().starts_with("[CONFIG.PARSE]"));
    }

    #[test]
    fn undefined_endpoint_stops_bootstrap() {
        let handler = ConfigHandler::from_str(
            "inline.yml",
            "files:\n  /var/log/pacman.log:\n    plugin: pacman\n    log_type: Pacman\n    rules:\n      Installed:\n        transformers:\n          Human:\n            endpoints: [missing]\n",
        )
        .unwrap();
        let err = build_manager(&handler).err().unwrap();
        let err = err.downcast::<WorkflowError>().unwrap();
        assert_eq!(err.code(), "WORKFLOW.ENDPOINT_UNDEFINED");
    }

    #[test]
    fn declarative_modules_are_resolvable() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("formats")).unwrap();
        fs::write(
            dir.path().join("formats/app.yml"),
            "Plain:\n  rules:\n    Any:\n      contains: \"\"\n      transforms:\n        Raw:\n          template: \"{{line}}\"\n",
        )
        .unwrap();
        let yaml = format!(
            "plugin_dir: {}\nendpoints:\n  out:\n    plugin: file\n    channel: File\n    vars:\n      path: {}\nfiles:\n  /var/log/app.log:\n    plugin: app\n    log_type: Plain\n    rules:\n      Any:\n        transformers:\n          Raw:\n            endpoints: [out]\n",
            dir.path().display(),
            dir.path().join("alerts.log").display()
        );
        let handler = ConfigHandler::from_str("inline.yml", &yaml).unwrap();
        let app = App::bootstrap(&handler).unwrap();
        assert_eq!(app.forest().len(), 1);
    }
}
