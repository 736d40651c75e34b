//! The four plugin roles a workflow tree is made of, and the class
//! machinery that lets configuration refer to them by name.
//!
//! A Format turns a raw line into a [`Record`], a Rule decides whether a
//! record is interesting, a Transform turns it into a [`Message`] and a
//! Channel delivers that message somewhere.

use std::{collections::BTreeMap, fmt};

use thiserror::Error;

use crate::{message::Message, record::Record};

pub mod builtin;
pub mod class;
pub mod declarative;
pub mod pattern;
pub mod registry;

pub use class::{ClassDef, Constructor, PluginClass, PluginModule};
pub use registry::{Namespace, PluginRegistry};

/// Destination variables, already stringified.
pub type Vars = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginRole {
    Format,
    Rule,
    Transform,
    Channel,
}

impl PluginRole {
    /// Depth of nodes of this role inside a workflow tree.
    pub fn level(self) -> usize {
        match self {
            PluginRole::Format => 0,
            PluginRole::Rule => 1,
            PluginRole::Transform => 2,
            PluginRole::Channel => 3,
        }
    }

    /// Role expected from the children of a node of this role.
    pub fn child(self) -> Option<PluginRole> {
        match self {
            PluginRole::Format => Some(PluginRole::Rule),
            PluginRole::Rule => Some(PluginRole::Transform),
            PluginRole::Transform => Some(PluginRole::Channel),
            PluginRole::Channel => None,
        }
    }
}

impl fmt::Display for PluginRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginRole::Format => "Format",
            PluginRole::Rule => "Rule",
            PluginRole::Transform => "Transform",
            PluginRole::Channel => "Channel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("line does not match pattern '{pattern}'")]
    NoMatch { pattern: String },

    #[error("field '{0}' is missing from the record")]
    MissingField(String),

    #[error("variable '{name}' is invalid: {reason}")]
    InvalidVar { name: String, reason: String },

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Pattern(#[from] regex::Error),

    #[error("template error: {0}")]
    Template(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("plugin panicked: {0}")]
    Panicked(String),
}

/// Parses a raw line. An error stops the line for the whole file.
pub trait Format: Send + Sync {
    fn parse(&self, line: &str) -> Result<Record, PluginError>;
}

/// `Ok(None)` halts the branch, `Ok(Some(record))` continues it with the
/// (possibly augmented) record.
pub trait Rule: Send + Sync {
    fn evaluate(&self, record: &Record) -> Result<Option<Record>, PluginError>;
}

pub trait Transform: Send + Sync {
    fn transform(&self, record: &Record) -> Result<Message, PluginError>;
}

pub trait Channel: Send + Sync {
    fn send(&self, message: &Message) -> Result<(), PluginError>;
}

impl<F> Format for F
where
    F: Fn(&str) -> Result<Record, PluginError> + Send + Sync,
{
    fn parse(&self, line: &str) -> Result<Record, PluginError> {
        self(line)
    }
}

impl<F> Rule for F
where
    F: Fn(&Record) -> Result<Option<Record>, PluginError> + Send + Sync,
{
    fn evaluate(&self, record: &Record) -> Result<Option<Record>, PluginError> {
        self(record)
    }
}

impl<F> Transform for F
where
    F: Fn(&Record) -> Result<Message, PluginError> + Send + Sync,
{
    fn transform(&self, record: &Record) -> Result<Message, PluginError> {
        self(record)
    }
}

impl<F> Channel for F
where
    F: Fn(&Message) -> Result<(), PluginError> + Send + Sync,
{
    fn send(&self, message: &Message) -> Result<(), PluginError> {
        self(message)
    }
}

/// A Channel that can be built from destination variables.
pub trait ChannelSpec: Channel + Sized + 'static {
    /// Exact set of variable names a destination must provide.
    const REQUIRED_VARS: &'static [&'static str];

    fn from_vars(destination: &str, vars: &Vars) -> Result<Self, PluginError>;
}

/// Fetch a variable that registration already guaranteed to exist.
pub fn var<'a>(vars: &'a Vars, name: &str) -> Result<&'a str, PluginError> {
    vars.get(name)
        .map(String::as_str)
        .ok_or_else(|| PluginError::InvalidVar {
            name: name.to_string(),
            reason: "not provided".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_nest_in_order() {
        let mut role = PluginRole::Format;
        let mut levels = vec![role.level()];
        while let Some(next) = role.child() {
            role = next;
            levels.push(role.level());
        }
        assert_eq!(levels, vec![0, 1, 2, 3]);
        assert_eq!(role, PluginRole::Channel);
    }

    #[test]
    fn closures_act_as_plugins() {
        let rule = |record: &Record| -> Result<Option<Record>, PluginError> {
            Ok(record.line().contains("ERROR").then(|| record.clone()))
        };
        assert!(rule.evaluate(&Record::raw("ERROR boom")).unwrap().is_some());
        assert!(rule.evaluate(&Record::raw("INFO ok")).unwrap().is_none());
    }
}
