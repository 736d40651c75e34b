//! Name-based lookup of plugin classes.
//!
//! Modules are registered explicitly, either compiled in
//! ([`PluginRegistry::with_builtins`]) or loaded from YAML
//! ([`super::declarative::load_dir`]), and resolved by
//! `(namespace, module, class)` while the workflow forest is built.
use std::{collections::HashMap, fmt, sync::Arc};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::WorkflowError;

use super::{PluginClass, PluginModule, PluginRole, builtin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Formats,
    Channels,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Formats => "formats",
            Namespace::Channels => "channels",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

struct RegisteredModule {
    classes: HashMap<String, Arc<PluginClass>>,
}

/// Holds every registered plugin module, keyed by `<namespace>.<module>`.
#[derive(Default)]
pub struct PluginRegistry {
    modules: DashMap<String, RegisteredModule>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the compiled-in format and channel modules.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for module in builtin::format_modules() {
            registry.register_module(Namespace::Formats, module);
        }
        for module in builtin::channel_modules() {
            registry.register_module(Namespace::Channels, module);
        }
        registry
    }

    /// Register (or replace) a module. Returns its qualified name.
    pub fn register_module(&self, namespace: Namespace, module: PluginModule) -> String {
        let key = format!("{}.{}", namespace.prefix(), module.name());
        let classes: HashMap<String, Arc<PluginClass>> = module
            .into_classes()
            .into_iter()
            .map(|def| (def.name().to_string(), def.build(&key)))
            .collect();
        debug!(module = %key, classes = classes.len(), "registered plugin module");
        if self
            .modules
            .insert(key.clone(), RegisteredModule { classes })
            .is_some()
        {
            warn!(module = %key, "plugin module was registered twice, keeping the latest");
        }
        key
    }

    pub fn contains(&self, namespace: Namespace, module: &str) -> bool {
        self.modules
            .contains_key(&format!("{}.{}", namespace.prefix(), module))
    }

    /// Sorted qualified names of every registered module.
    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Resolve a top-level class and check that it plays `expected`.
    pub fn resolve(
        &self,
        namespace: Namespace,
        module: &str,
        class: &str,
        expected: PluginRole,
    ) -> Result<Arc<PluginClass>, WorkflowError> {
        let key = format!("{}.{}", namespace.prefix(), module);
        let entry = self
            .modules
            .get(&key)
            .ok_or_else(|| WorkflowError::PluginModuleNotFound { module: key.clone() })?;
        let resolved = entry
            .classes
            .get(class)
            .cloned()
            .ok_or_else(|| WorkflowError::PluginClassNotFound {
                class: class.to_string(),
                parent: key.clone(),
            })?;
        resolved.expect_role(expected)?;
        Ok(resolved)
    }

    /// Resolve a class nested in `parent`, e.g. a Rule of a Format.
    pub fn resolve_member(
        parent: &PluginClass,
        name: &str,
        expected: PluginRole,
    ) -> Result<Arc<PluginClass>, WorkflowError> {
        let member = parent
            .member(name)
            .cloned()
            .ok_or_else(|| WorkflowError::PluginClassNotFound {
                class: name.to_string(),
                parent: parent.qualified_name().to_string(),
            })?;
        member.expect_role(expected)?;
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        message::Message,
        plugin::{ClassDef, PluginError},
        record::Record,
    };

    fn echo(record: &Record) -> Result<Message, PluginError> {
        Ok(Message::text(record.line()))
    }

    fn registry() -> PluginRegistry {
        let registry = PluginRegistry::new();
        registry.register_module(
            Namespace::Formats,
            PluginModule::new("broken").class(ClassDef::transform("NotAFormat", || Ok(echo))),
        );
        registry
    }

    #[test]
    fn unknown_module() {
        let err = registry()
            .resolve(Namespace::Formats, "nginx", "Nginx", PluginRole::Format)
            .unwrap_err();
        assert_eq!(err.code(), "WORKFLOW.PLUGIN_MODULE_NOT_FOUND");
        assert!(err.to_string().contains("formats.nginx"));
    }

    #[test]
    fn unknown_class_names_its_parent() {
        let err = registry()
            .resolve(Namespace::Formats, "broken", "Missing", PluginRole::Format)
            .unwrap_err();
        match err {
            WorkflowError::PluginClassNotFound { class, parent } => {
                assert_eq!(class, "Missing");
                assert_eq!(parent, "formats.broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_role_is_rejected() {
        let err = registry()
            .resolve(Namespace::Formats, "broken", "NotAFormat", PluginRole::Format)
            .unwrap_err();
        assert_eq!(err.code(), "WORKFLOW.PLUGIN_INHERITANCE");
    }

    #[test]
    fn namespaces_are_separate() {
        let registry = registry();
        assert!(registry.contains(Namespace::Formats, "broken"));
        assert!(!registry.contains(Namespace::Channels, "broken"));
    }

    #[test]
    fn builtins_are_registered() {
        let registry = PluginRegistry::with_builtins();
        let pacman = registry
            .resolve(Namespace::Formats, "pacman", "Pacman", PluginRole::Format)
            .unwrap();
        let rule = PluginRegistry::resolve_member(&pacman, "RunCommand", PluginRole::Rule).unwrap();
        PluginRegistry::resolve_member(&rule, "Summary", PluginRole::Transform).unwrap();

        for (module, class) in [
            ("file", "File"),
            ("telegram", "Telegram"),
            ("twilio_sms", "TwilioSMS"),
            ("discord", "Discord"),
        ] {
            registry
                .resolve(Namespace::Channels, module, class, PluginRole::Channel)
                .unwrap();
        }

        let smtp = registry
            .resolve(Namespace::Channels, "smtp", "SMTP", PluginRole::Channel)
            .unwrap();
        let vars: Vec<&str> = smtp.required_vars().iter().map(String::as_str).collect();
        assert_eq!(
            vars,
            ["ip", "password", "port", "recipient", "sender", "timeout", "username"]
        );
    }

    #[test]
    fn resolving_twice_yields_the_same_class() {
        let registry = PluginRegistry::with_builtins();
        let a = registry
            .resolve(Namespace::Channels, "file", "File", PluginRole::Channel)
            .unwrap();
        let b = registry
            .resolve(Namespace::Channels, "file", "File", PluginRole::Channel)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
