use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::error::WorkflowError;

use super::{Channel, ChannelSpec, Format, PluginError, PluginRole, Rule, Transform, Vars};

pub type FormatFactory = Arc<dyn Fn() -> Result<Arc<dyn Format>, PluginError> + Send + Sync>;
pub type RuleFactory = Arc<dyn Fn() -> Result<Arc<dyn Rule>, PluginError> + Send + Sync>;
pub type TransformFactory = Arc<dyn Fn() -> Result<Arc<dyn Transform>, PluginError> + Send + Sync>;
pub type ChannelFactory =
    Arc<dyn Fn(&str, &Vars) -> Result<Arc<dyn Channel>, PluginError> + Send + Sync>;

/// How to build an instance of a class. The variant is the role the class
/// plays, so a class can only ever produce instances of its own role.
#[derive(Clone)]
pub enum Constructor {
    Format(FormatFactory),
    Rule(RuleFactory),
    Transform(TransformFactory),
    Channel(ChannelFactory),
}

impl Constructor {
    pub fn role(&self) -> PluginRole {
        match self {
            Constructor::Format(_) => PluginRole::Format,
            Constructor::Rule(_) => PluginRole::Rule,
            Constructor::Transform(_) => PluginRole::Transform,
            Constructor::Channel(_) => PluginRole::Channel,
        }
    }
}

/// A registered, named plugin class. Two classes are the same class only
/// if they are the same `Arc`.
pub struct PluginClass {
    name: String,
    qualified_name: String,
    constructor: Constructor,
    required_vars: BTreeSet<String>,
    members: Vec<Arc<PluginClass>>,
}

impl fmt::Debug for PluginClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginClass")
            .field("qualified_name", &self.qualified_name)
            .field("role", &self.role())
            .field("required_vars", &self.required_vars)
            .field("members", &self.members.len())
            .finish()
    }
}

impl PluginClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<namespace>.<module>.<Class>[.<Member>...]`
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn role(&self) -> PluginRole {
        self.constructor.role()
    }

    pub fn required_vars(&self) -> &BTreeSet<String> {
        &self.required_vars
    }

    pub fn members(&self) -> &[Arc<PluginClass>] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Arc<PluginClass>> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn expect_role(&self, expected: PluginRole) -> Result<(), WorkflowError> {
        if self.role() == expected {
            Ok(())
        } else {
            Err(self.role_mismatch(expected))
        }
    }

    fn role_mismatch(&self, expected: PluginRole) -> WorkflowError {
        WorkflowError::PluginInheritance {
            class: self.qualified_name.clone(),
            expected,
            actual: self.role(),
        }
    }

    fn init_error(&self, source: PluginError) -> WorkflowError {
        WorkflowError::PluginInit {
            class: self.qualified_name.clone(),
            source,
        }
    }

    pub fn new_format(&self) -> Result<Arc<dyn Format>, WorkflowError> {
        match &self.constructor {
            Constructor::Format(factory) => factory().map_err(|e| self.init_error(e)),
            _ => Err(self.role_mismatch(PluginRole::Format)),
        }
    }

    pub fn new_rule(&self) -> Result<Arc<dyn Rule>, WorkflowError> {
        match &self.constructor {
            Constructor::Rule(factory) => factory().map_err(|e| self.init_error(e)),
            _ => Err(self.role_mismatch(PluginRole::Rule)),
        }
    }

    pub fn new_transform(&self) -> Result<Arc<dyn Transform>, WorkflowError> {
        match &self.constructor {
            Constructor::Transform(factory) => factory().map_err(|e| self.init_error(e)),
            _ => Err(self.role_mismatch(PluginRole::Transform)),
        }
    }

    pub fn new_channel(
        &self,
        destination: &str,
        vars: &Vars,
    ) -> Result<Arc<dyn Channel>, WorkflowError> {
        match &self.constructor {
            Constructor::Channel(factory) => {
                factory(destination, vars).map_err(|source| WorkflowError::ChannelInit {
                    endpoint: destination.to_string(),
                    channel: self.qualified_name.clone(),
                    source,
                })
            }
            _ => Err(self.role_mismatch(PluginRole::Channel)),
        }
    }
}

/// Unregistered class definition. Qualified names are assigned when the
/// owning module is registered.
pub struct ClassDef {
    name: String,
    constructor: Constructor,
    required_vars: BTreeSet<String>,
    members: Vec<ClassDef>,
}

impl ClassDef {
    fn with_constructor(name: impl Into<String>, constructor: Constructor) -> Self {
        Self {
            name: name.into(),
            constructor,
            required_vars: BTreeSet::new(),
            members: Vec::new(),
        }
    }

    pub fn format<F, T>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<T, PluginError> + Send + Sync + 'static,
        T: Format + 'static,
    {
        let factory: FormatFactory =
            Arc::new(move || factory().map(|f| Arc::new(f) as Arc<dyn Format>));
        Self::with_constructor(name, Constructor::Format(factory))
    }

    pub fn rule<F, T>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<T, PluginError> + Send + Sync + 'static,
        T: Rule + 'static,
    {
        let factory: RuleFactory = Arc::new(move || factory().map(|r| Arc::new(r) as Arc<dyn Rule>));
        Self::with_constructor(name, Constructor::Rule(factory))
    }

    pub fn transform<F, T>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<T, PluginError> + Send + Sync + 'static,
        T: Transform + 'static,
    {
        let factory: TransformFactory =
            Arc::new(move || factory().map(|t| Arc::new(t) as Arc<dyn Transform>));
        Self::with_constructor(name, Constructor::Transform(factory))
    }

    pub fn channel<C: ChannelSpec>(name: impl Into<String>) -> Self {
        Self::channel_with(name, C::REQUIRED_VARS, C::from_vars)
    }

    pub fn channel_with<F, T>(name: impl Into<String>, required: &[&str], factory: F) -> Self
    where
        F: Fn(&str, &Vars) -> Result<T, PluginError> + Send + Sync + 'static,
        T: Channel + 'static,
    {
        let factory: ChannelFactory = Arc::new(move |destination: &str, vars: &Vars| {
            factory(destination, vars).map(|c| Arc::new(c) as Arc<dyn Channel>)
        });
        let mut def = Self::with_constructor(name, Constructor::Channel(factory));
        def.required_vars = required.iter().map(|v| v.to_string()).collect();
        def
    }

    pub fn member(mut self, def: ClassDef) -> Self {
        self.members.push(def);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn build(self, parent: &str) -> Arc<PluginClass> {
        let qualified_name = format!("{parent}.{}", self.name);
        let members = self
            .members
            .into_iter()
            .map(|m| m.build(&qualified_name))
            .collect();
        Arc::new(PluginClass {
            name: self.name,
            qualified_name,
            constructor: self.constructor,
            required_vars: self.required_vars,
            members,
        })
    }
}

/// A named group of classes, registered under a [`super::Namespace`].
pub struct PluginModule {
    name: String,
    classes: Vec<ClassDef>,
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classes: Vec<&str> = self.classes.iter().map(ClassDef::name).collect();
        f.debug_struct("PluginModule")
            .field("name", &self.name)
            .field("classes", &classes)
            .finish()
    }
}

impl PluginModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    pub fn class(mut self, def: ClassDef) -> Self {
        self.classes.push(def);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_classes(self) -> Vec<ClassDef> {
        self.classes
    }
}
