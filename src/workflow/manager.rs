// src/workflow/manager.rs

use std::{
    collections::{BTreeMap, btree_map::Entry},
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;

use crate::{
    error::WorkflowError,
    plugin::{Namespace, PluginRegistry, PluginRole, Vars},
};

use super::{
    destination::DestinationRegistry,
    forest::{TreeView, WorkflowForest},
    node::{EndpointNode, FormatNode},
};

/// Builds one workflow tree per monitored file from flat configuration
/// rows. Rows are merged: a rule or transform that is already present
/// under the same parent is reused, endpoints are always appended.
pub struct WorkflowManager {
    registry: Arc<PluginRegistry>,
    destinations: DestinationRegistry,
    files: BTreeMap<PathBuf, FormatNode>,
}

impl WorkflowManager {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            destinations: DestinationRegistry::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn destinations(&self) -> &DestinationRegistry {
        &self.destinations
    }

    /// Register destination `endpoint` as channel `channels.<module>.<class>`.
    pub fn load_endpoint(
        &mut self,
        module: &str,
        class: &str,
        endpoint: &str,
        vars: Vars,
    ) -> Result<(), WorkflowError> {
        self.destinations
            .register(&self.registry, module, class, endpoint, vars)
    }

    /// Merge one `(file, format, rule, transform, endpoint)` row into the
    /// tree of `path`.
    pub fn load_file(
        &mut self,
        path: impl AsRef<Path>,
        format_module: &str,
        format_name: &str,
        rule_name: &str,
        transform_name: &str,
        endpoint: &str,
    ) -> Result<(), WorkflowError> {
        let path = path.as_ref();
        let format = self.registry.resolve(
            Namespace::Formats,
            format_module,
            format_name,
            PluginRole::Format,
        )?;
        let rule = PluginRegistry::resolve_member(&format, rule_name, PluginRole::Rule)?;
        let transform = PluginRegistry::resolve_member(&rule, transform_name, PluginRole::Transform)?;
        let destination =
            self.destinations
                .get(endpoint)
                .ok_or_else(|| WorkflowError::DestinationUndefined {
                    endpoint: endpoint.to_string(),
                    path: path.to_path_buf(),
                })?;

        let leaf = EndpointNode::new(destination.class.clone(), endpoint, &destination.vars)?;
        match self.files.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => {
                let root = entry.into_mut();
                if !Arc::ptr_eq(root.class(), &format) {
                    return Err(WorkflowError::FormatMismatch {
                        path: path.to_path_buf(),
                        existing: root.class().qualified_name().to_string(),
                        requested: format.qualified_name().to_string(),
                    });
                }
                root.graft(&rule, &transform, leaf)?;
            }
            Entry::Vacant(entry) => {
                let mut root = FormatNode::new(format.clone())?;
                root.graft(&rule, &transform, leaf)?;
                entry.insert(root);
            }
        }

        info!(
            file = %path.display(),
            format = %format.qualified_name(),
            rule = %rule_name,
            transform = %transform_name,
            channel = %destination.class.qualified_name(),
            endpoint = %endpoint,
            "loaded workflow"
        );
        Ok(())
    }

    pub fn get_workflow(&self, path: impl AsRef<Path>) -> Option<&FormatNode> {
        self.files.get(path.as_ref())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    pub fn render_trees(&self) -> String {
        TreeView(&self.files).to_string()
    }

    /// Freeze the trees. Nothing can be added afterwards.
    pub fn into_forest(self) -> WorkflowForest {
        WorkflowForest::new(self.files)
    }
}
