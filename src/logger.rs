use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `sendlog=debug,reqwest=warn`.
    pub log_level: String,
    /// Daily rolling JSON log, next to stdout output.
    pub log_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_path: None,
        }
    }
}

impl LogConfig {
    pub fn new(log_level: impl Into<String>, log_path: Option<PathBuf>) -> Self {
        Self {
            log_level: log_level.into(),
            log_path,
        }
    }
}

fn env_filter(log_level: &str) -> Result<EnvFilter> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level '{log_level}'"))?
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);
    Ok(filter)
}

/// Directory and file name for a rolling appender; a bare file name lives
/// in the current directory.
fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let Some(name) = path.file_name() else {
        bail!("log path '{}' has no file name", path.display());
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(name)))
}

/// Install the global subscriber: human readable events on stdout and,
/// with a `log_path`, newline delimited JSON in a daily rolling file.
/// Keep the returned guard alive for as long as the file should be written.
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let stdout_layer = fmt::layer().with_target(false);

    let (file_layer, guard) = match &config.log_path {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            fs::create_dir_all(&dir)
                .with_context(|| format!("could not create log directory {}", dir.display()))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, &dir, &name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(env_filter(&config.log_level)?)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("a tracing subscriber is already installed")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_absolute_and_bare_paths() {
        let (dir, name) = split_log_path(Path::new("/var/log/sendlog/sendlog.log")).unwrap();
        assert_eq!(dir, PathBuf::from("/var/log/sendlog"));
        assert_eq!(name, PathBuf::from("sendlog.log"));

        let (dir, name) = split_log_path(Path::new("sendlog.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, PathBuf::from("sendlog.log"));

        assert!(split_log_path(Path::new("/")).is_err());
    }

    #[test]
    fn filter_accepts_directives() {
        assert!(env_filter("info").is_ok());
        assert!(env_filter("sendlog=debug,notify=warn").is_ok());
        assert!(env_filter("sendlog=[").is_err());
    }
}
