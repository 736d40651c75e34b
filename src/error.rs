// src/error.rs

use std::{collections::BTreeSet, fmt, path::PathBuf};

use thiserror::Error;
use tracing::error;

use crate::plugin::{PluginError, PluginRole};

/// Raised while registering destinations or building the workflow forest.
/// Every variant is fatal at startup.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("referenced plugin module '{module}' could not be found")]
    PluginModuleNotFound { module: String },

    #[error("referenced plugin class '{class}' could not be found in '{parent}'")]
    PluginClassNotFound { class: String, parent: String },

    #[error("plugin class '{class}' is not a {expected} plugin, it is a {actual} plugin")]
    PluginInheritance {
        class: String,
        expected: PluginRole,
        actual: PluginRole,
    },

    #[error(
        "channel '{channel}' expects variable(s) {required:?} from endpoint '{endpoint}', got {received:?}"
    )]
    EndpointVariableMismatch {
        endpoint: String,
        channel: String,
        required: BTreeSet<String>,
        received: BTreeSet<String>,
    },

    #[error("endpoint '{endpoint}' used by the worktree of '{}' is not defined", .path.display())]
    DestinationUndefined { endpoint: String, path: PathBuf },

    #[error("'{}' is already monitored as '{existing}', cannot add it as '{requested}'", .path.display())]
    FormatMismatch {
        path: PathBuf,
        existing: String,
        requested: String,
    },

    #[error("plugin class '{class}' could not be instantiated: {source}")]
    PluginInit {
        class: String,
        #[source]
        source: PluginError,
    },

    #[error("channel '{channel}' could not be created for endpoint '{endpoint}': {source}")]
    ChannelInit {
        endpoint: String,
        channel: String,
        #[source]
        source: PluginError,
    },

    #[error("plugin module '{module}' is invalid: {reason}")]
    InvalidModule { module: String, reason: String },
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::PluginModuleNotFound { .. } => "WORKFLOW.PLUGIN_MODULE_NOT_FOUND",
            WorkflowError::PluginClassNotFound { .. } => "WORKFLOW.PLUGIN_CLASS_NOT_FOUND",
            WorkflowError::PluginInheritance { .. } => "WORKFLOW.PLUGIN_INHERITANCE",
            WorkflowError::EndpointVariableMismatch { .. } => "WORKFLOW.ENDPOINT_VARIABLE_MISMATCH",
            WorkflowError::DestinationUndefined { .. } => "WORKFLOW.ENDPOINT_UNDEFINED",
            WorkflowError::FormatMismatch { .. } => "WORKFLOW.FORMAT_MISMATCH",
            WorkflowError::PluginInit { .. } => "WORKFLOW.PLUGIN_INIT",
            WorkflowError::ChannelInit { .. } => "WORKFLOW.CHANNEL_INIT",
            WorkflowError::InvalidModule { .. } => "WORKFLOW.INVALID_MODULE",
        }
    }

    pub fn log(&self) {
        match self {
            WorkflowError::EndpointVariableMismatch {
                endpoint,
                channel,
                required,
                received,
            } => error!(
                code = self.code(),
                endpoint = %endpoint,
                channel = %channel,
                required = ?required,
                received = ?received,
                "{}", self
            ),
            WorkflowError::DestinationUndefined { endpoint, path } => error!(
                code = self.code(),
                endpoint = %endpoint,
                worktree_file_path = %path.display(),
                "{}", self
            ),
            _ => error!(code = self.code(), "{}", self),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("environment variable '{name}' referenced by '{key}' is not set")]
    MissingEnv { name: String, key: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "CONFIG.IO",
            ConfigError::Parse { .. } => "CONFIG.PARSE",
            ConfigError::MissingEnv { .. } => "CONFIG.MISSING_ENV",
        }
    }

    pub fn log(&self) {
        error!(code = self.code(), "{}", self);
    }
}

/// Pipeline stage a runtime failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    Parse,
    Rule,
    Transform,
    Deliver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Lookup => "lookup",
            Stage::Parse => "parse",
            Stage::Rule => "rule",
            Stage::Transform => "transform",
            Stage::Deliver => "delivery",
        };
        f.write_str(name)
    }
}

/// A plugin failure while a line travels through a workflow tree.
/// Logged and recorded in the execution report, never propagated.
#[derive(Debug, Error)]
#[error("{stage} failed in '{node}' for '{}': {source}", .path.display())]
pub struct RuntimeError {
    pub stage: Stage,
    pub node: String,
    pub destination: Option<String>,
    pub path: PathBuf,
    pub line: String,
    #[source]
    pub source: PluginError,
}

impl RuntimeError {
    pub fn code(&self) -> &'static str {
        match self.stage {
            Stage::Lookup => "RUNTIME.UNKNOWN_FILE",
            Stage::Parse => "RUNTIME.PARSE_ERROR",
            Stage::Rule => "RUNTIME.RULE_ERROR",
            Stage::Transform => "RUNTIME.TRANSFORM_ERROR",
            Stage::Deliver => "RUNTIME.ENDPOINT_ERROR",
        }
    }

    pub fn log(&self) {
        error!(
            code = self.code(),
            node = %self.node,
            destination = self.destination.as_deref().unwrap_or("-"),
            file = %self.path.display(),
            line = %self.line,
            error = %self.source,
            "{} failed",
            self.stage
        );
    }
}
