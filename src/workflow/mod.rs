//! Per-file workflow trees: built from configuration rows by
//! [`WorkflowManager`], frozen into a [`WorkflowForest`] and executed
//! once per log line.
pub mod destination;
pub mod forest;
pub mod manager;
pub mod node;

pub use destination::{Destination, DestinationRegistry};
pub use forest::{ExecutionReport, WorkflowForest};
pub use manager::WorkflowManager;
pub use node::{EndpointNode, FormatNode, RuleNode, TransformNode};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use crate::{
        message::Message,
        plugin::{
            ClassDef, Namespace, PluginError, PluginModule, PluginRegistry, Vars,
            pattern::{PatternFormat, PatternRule, TemplateTransform},
        },
        record::Record,
    };

    /// Collects `(destination, body)` for every delivered message.
    #[derive(Clone, Default)]
    pub struct Sink(Arc<Mutex<Vec<(String, String)>>>);

    impl Sink {
        pub fn take(&self) -> Vec<(String, String)> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    pub fn named(name: &str) -> Vars {
        Vars::from([("name".to_string(), name.to_string())])
    }

    fn upper(record: &Record) -> Result<Message, PluginError> {
        Ok(Message::text(record.get_str("msg").unwrap_or_default().to_uppercase()))
    }

    fn explode(_: &Record) -> Result<Option<Record>, PluginError> {
        panic!("rule exploded")
    }

    fn echo() -> ClassDef {
        ClassDef::transform("Echo", || TemplateTransform::new("{{msg}}", None))
    }

    /// `formats.test` with `Line` (`LEVEL message`) and `Other` (raw),
    /// `channels.memory` with `Memory`, `Failing`, `Panicking` and
    /// `Unreachable` (never constructs).
    /// `Error/Ticket` renders a field no record has, `Error/Broken` never
    /// instantiates.
    pub fn registry(sink: &Sink) -> PluginRegistry {
        let registry = PluginRegistry::new();
        registry.register_module(
            Namespace::Formats,
            PluginModule::new("test")
                .class(
                    ClassDef::format("Line", || {
                        PatternFormat::new(Some(r"^(?P<level>[A-Z]+) (?P<msg>.*)$"))
                    })
                    .member(
                        ClassDef::rule("Error", || PatternRule::new(Some("level"), "^ERROR$"))
                            .member(echo())
                            .member(ClassDef::transform("Upper", || Ok(upper)))
                            .member(ClassDef::transform("Ticket", || {
                                TemplateTransform::new("ticket {{ticket}}", None)
                            }))
                            .member(ClassDef::transform("Broken", || {
                                TemplateTransform::new("{{#if level}}unclosed", None)
                            })),
                    )
                    .member(
                        ClassDef::rule("Any", || Ok(PatternRule::contains(None, "")))
                            .member(echo()),
                    )
                    .member(ClassDef::rule("Explode", || Ok(explode)).member(echo())),
                )
                .class(
                    ClassDef::format("Other", || Ok(PatternFormat::passthrough()))
                        .member(
                            ClassDef::rule("Any", || Ok(PatternRule::contains(None, "")))
                                .member(echo()),
                        ),
                ),
        );

        let sink = sink.clone();
        registry.register_module(
            Namespace::Channels,
            PluginModule::new("memory")
                .class(ClassDef::channel_with("Memory", &["name"], move |destination, _| {
                    let sink = sink.clone();
                    let destination = destination.to_string();
                    Ok(move |message: &Message| -> Result<(), PluginError> {
                        sink.0
                            .lock()
                            .unwrap()
                            .push((destination.clone(), message.body()));
                        Ok(())
                    })
                }))
                .class(ClassDef::channel_with("Failing", &[], |_, _| {
                    Ok(|_: &Message| -> Result<(), PluginError> {
                        Err(PluginError::Delivery("connection refused".into()))
                    })
                }))
                .class(ClassDef::channel_with("Panicking", &[], |_, _| {
                    Ok(|_: &Message| -> Result<(), PluginError> { panic!("channel exploded") })
                }))
                .class(ClassDef::channel_with("Unreachable", &[], |_, _| {
                    Err::<fn(&Message) -> Result<(), PluginError>, _>(PluginError::Delivery(
                        "host unreachable".into(),
                    ))
                })),
        );
        registry
    }
}
