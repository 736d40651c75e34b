use std::sync::Arc;

use crate::{
    error::WorkflowError,
    plugin::{Channel, Format, PluginClass, Rule, Transform, Vars},
};

/// Root of a per-file tree.
pub struct FormatNode {
    class: Arc<PluginClass>,
    instance: Arc<dyn Format>,
    rules: Vec<RuleNode>,
}

pub struct RuleNode {
    class: Arc<PluginClass>,
    instance: Arc<dyn Rule>,
    transforms: Vec<TransformNode>,
}

pub struct TransformNode {
    class: Arc<PluginClass>,
    instance: Arc<dyn Transform>,
    endpoints: Vec<EndpointNode>,
}

/// Leaf: one channel instance bound to one destination.
pub struct EndpointNode {
    class: Arc<PluginClass>,
    destination: String,
    instance: Arc<dyn Channel>,
}

/// A child that already exists, or one built but not attached yet.
enum Slot<T> {
    Existing(usize),
    New(T),
}

impl<T> Slot<T> {
    fn place(self, children: &mut Vec<T>) -> &mut T {
        let index = match self {
            Slot::Existing(index) => index,
            Slot::New(node) => {
                children.push(node);
                children.len() - 1
            }
        };
        &mut children[index]
    }
}

impl FormatNode {
    pub fn new(class: Arc<PluginClass>) -> Result<Self, WorkflowError> {
        let instance = class.new_format()?;
        Ok(Self {
            class,
            instance,
            rules: Vec::new(),
        })
    }

    pub fn class(&self) -> &Arc<PluginClass> {
        &self.class
    }

    pub fn instance(&self) -> &Arc<dyn Format> {
        &self.instance
    }

    pub fn rules(&self) -> &[RuleNode] {
        &self.rules
    }

    /// Attach `leaf` under `rule` and `transform`, reusing children of the
    /// same class. Missing nodes are instantiated before anything is
    /// attached, so a failed instantiation leaves the tree untouched.
    pub fn graft(
        &mut self,
        rule: &Arc<PluginClass>,
        transform: &Arc<PluginClass>,
        leaf: EndpointNode,
    ) -> Result<(), WorkflowError> {
        let rule_slot = match self.rules.iter().position(|r| Arc::ptr_eq(&r.class, rule)) {
            Some(index) => Slot::Existing(index),
            None => Slot::New(RuleNode::new(rule.clone())?),
        };
        let transform_slot = match &rule_slot {
            Slot::Existing(index) => self.rules[*index].transform_slot(transform)?,
            Slot::New(node) => node.transform_slot(transform)?,
        };
        rule_slot
            .place(&mut self.rules)
            .place_transform(transform_slot)
            .push_endpoint(leaf);
        Ok(())
    }
}

impl RuleNode {
    pub fn new(class: Arc<PluginClass>) -> Result<Self, WorkflowError> {
        let instance = class.new_rule()?;
        Ok(Self {
            class,
            instance,
            transforms: Vec::new(),
        })
    }

    pub fn class(&self) -> &Arc<PluginClass> {
        &self.class
    }

    pub fn instance(&self) -> &Arc<dyn Rule> {
        &self.instance
    }

    pub fn transforms(&self) -> &[TransformNode] {
        &self.transforms
    }

    fn transform_slot(&self, class: &Arc<PluginClass>) -> Result<Slot<TransformNode>, WorkflowError> {
        match self.transforms.iter().position(|t| Arc::ptr_eq(&t.class, class)) {
            Some(index) => Ok(Slot::Existing(index)),
            None => TransformNode::new(class.clone()).map(Slot::New),
        }
    }

    fn place_transform(&mut self, slot: Slot<TransformNode>) -> &mut TransformNode {
        slot.place(&mut self.transforms)
    }
}

impl TransformNode {
    pub fn new(class: Arc<PluginClass>) -> Result<Self, WorkflowError> {
        let instance = class.new_transform()?;
        Ok(Self {
            class,
            instance,
            endpoints: Vec::new(),
        })
    }

    pub fn class(&self) -> &Arc<PluginClass> {
        &self.class
    }

    pub fn instance(&self) -> &Arc<dyn Transform> {
        &self.instance
    }

    pub fn endpoints(&self) -> &[EndpointNode] {
        &self.endpoints
    }

    /// Endpoints are never merged: every call appends a fresh channel.
    pub fn push_endpoint(&mut self, endpoint: EndpointNode) {
        self.endpoints.push(endpoint);
    }
}

impl EndpointNode {
    pub fn new(
        class: Arc<PluginClass>,
        destination: &str,
        vars: &Vars,
    ) -> Result<Self, WorkflowError> {
        let instance = class.new_channel(destination, vars)?;
        Ok(Self {
            class,
            destination: destination.to_string(),
            instance,
        })
    }

    pub fn class(&self) -> &Arc<PluginClass> {
        &self.class
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn instance(&self) -> &Arc<dyn Channel> {
        &self.instance
    }
}
