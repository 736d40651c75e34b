use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{error::ConfigError, logger::LogConfig, plugin::Vars, util::ordered_map};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/sendlog/sendlog.yml";

static ENV_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rescan_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendlogConfig {
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `None` or 0 means an unbounded dispatch queue.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,
    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,
    #[serde(default, deserialize_with = "ordered_map")]
    pub endpoints: Vec<(String, EndpointConfig)>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub files: Vec<(PathBuf, FileConfig)>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub plugin: String,
    pub channel: String,
    #[serde(default, deserialize_with = "ordered_map")]
    pub vars: Vec<(String, VarValue)>,
}

/// Scalar endpoint variable; channels always receive it as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Bool(b) => write!(f, "{b}"),
            VarValue::Int(i) => write!(f, "{i}"),
            VarValue::Float(x) => write!(f, "{x}"),
            VarValue::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub plugin: String,
    pub log_type: String,
    #[serde(default, deserialize_with = "ordered_map")]
    pub rules: Vec<(String, RuleConfig)>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default, deserialize_with = "ordered_map")]
    pub transformers: Vec<(String, TransformerConfig)>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformerConfig {
    #[serde(default)]
    pub endpoints: Vec<String>,
}

/// One `endpoints:` entry, ready for `WorkflowManager::load_endpoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRow {
    pub plugin: String,
    pub channel: String,
    pub endpoint: String,
    pub vars: Vars,
}

/// One path from a file down to an endpoint, ready for
/// `WorkflowManager::load_file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRow {
    pub path: PathBuf,
    pub plugin: String,
    pub log_type: String,
    pub rule: String,
    pub transform: String,
    pub endpoint: String,
}

pub struct ConfigHandler {
    path: PathBuf,
    config: SendlogConfig,
}

impl ConfigHandler {
    /// Read the YAML file at `path`. A `.env` file in the same directory is
    /// loaded into the process environment first, if there is one.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let env_file = path
            .parent()
            .map(|dir| dir.join(".env"))
            .unwrap_or_else(|| PathBuf::from(".env"));
        if env_file.is_file() {
            dotenvy::from_path(&env_file).map_err(|e| ConfigError::Parse {
                path: env_file.clone(),
                message: e.to_string(),
            })?;
            info!(file = %env_file.display(), "loaded environment file");
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(path, &contents)
    }

    /// Parse configuration text; `path` is only used in error messages.
    pub fn from_str(path: impl Into<PathBuf>, contents: &str) -> Result<Self, ConfigError> {
        let path = path.into();
        let config: SendlogConfig =
            serde_yaml_bw::from_str(contents).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;
        debug!(
            file = %path.display(),
            endpoints = config.endpoints.len(),
            files = config.files.len(),
            "configuration parsed"
        );
        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &SendlogConfig {
        &self.config
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig::new(self.config.log_level.clone(), self.config.log_path.clone())
    }

    /// Endpoint registrations in document order, with `${NAME}` expanded
    /// from the environment.
    pub fn endpoints(&self) -> Result<Vec<EndpointRow>, ConfigError> {
        self.config
            .endpoints
            .iter()
            .map(|(endpoint, cfg)| {
                let vars = cfg
                    .vars
                    .iter()
                    .map(|(name, value)| {
                        let key = format!("endpoints.{endpoint}.vars.{name}");
                        Ok((name.clone(), expand_env(&value.to_string(), &key)?))
                    })
                    .collect::<Result<Vars, ConfigError>>()?;
                Ok(EndpointRow {
                    plugin: cfg.plugin.clone(),
                    channel: cfg.channel.clone(),
                    endpoint: endpoint.clone(),
                    vars,
                })
            })
            .collect()
    }

    /// Every `(file, format, rule, transform, endpoint)` row in document
    /// order.
    pub fn files(&self) -> Vec<WorkflowRow> {
        let mut rows = Vec::new();
        for (path, file) in &self.config.files {
            for (rule, rule_cfg) in &file.rules {
                for (transform, transform_cfg) in &rule_cfg.transformers {
                    for endpoint in &transform_cfg.endpoints {
                        rows.push(WorkflowRow {
                            path: path.clone(),
                            plugin: file.plugin.clone(),
                            log_type: file.log_type.clone(),
                            rule: rule.clone(),
                            transform: transform.clone(),
                            endpoint: endpoint.clone(),
                        });
                    }
                }
            }
        }
        rows
    }
}

fn expand_env(value: &str, key: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let expanded = ENV_PLACEHOLDER.replace_all(value, |caps: &Captures| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ConfigError::MissingEnv {
            name,
            key: key.to_string(),
        }),
        None => Ok(expanded.into_owned()),
    }
}
