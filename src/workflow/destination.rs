use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use tracing::{info, warn};

use crate::{
    error::WorkflowError,
    plugin::{Namespace, PluginClass, PluginRegistry, PluginRole, Vars},
};

/// A named binding of a Channel class to the variables it is built with.
#[derive(Debug, Clone)]
pub struct Destination {
    pub class: Arc<PluginClass>,
    pub vars: Vars,
}

#[derive(Debug, Default)]
pub struct DestinationRegistry {
    destinations: HashMap<String, Destination>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `channels.<module>.<class>` and bind it to `name`. The
    /// variable names must match the channel's required variables exactly.
    pub fn register(
        &mut self,
        registry: &PluginRegistry,
        module: &str,
        class: &str,
        name: &str,
        vars: Vars,
    ) -> Result<(), WorkflowError> {
        let channel = registry.resolve(Namespace::Channels, module, class, PluginRole::Channel)?;
        let received: BTreeSet<String> = vars.keys().cloned().collect();
        if &received != channel.required_vars() {
            return Err(WorkflowError::EndpointVariableMismatch {
                endpoint: name.to_string(),
                channel: channel.qualified_name().to_string(),
                required: channel.required_vars().clone(),
                received,
            });
        }

        info!(endpoint = %name, channel = %channel.qualified_name(), "registered endpoint");
        let destination = Destination { class: channel, vars };
        if self.destinations.insert(name.to_string(), destination).is_some() {
            warn!(endpoint = %name, "endpoint was defined twice, keeping the latest");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Destination> {
        self.destinations.get(name)
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}
