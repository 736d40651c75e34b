// src/workflow/forest.rs

use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use crate::{
    error::{RuntimeError, Stage},
    plugin::PluginError,
};

use super::node::FormatNode;

/// What happened to one line.
#[derive(Debug)]
pub struct ExecutionReport {
    pub path: PathBuf,
    pub started: DateTime<Utc>,
    /// total elapsed wall time
    pub total: TimeDelta,
    pub parsed: bool,
    pub rules_passed: usize,
    pub messages: usize,
    pub delivered: usize,
    pub failures: Vec<RuntimeError>,
}

impl ExecutionReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            started: Utc::now(),
            total: TimeDelta::zero(),
            parsed: false,
            rules_passed: 0,
            messages: 0,
            delivered: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn finish(mut self) -> Self {
        self.total = Utc::now() - self.started;
        self
    }
}

/// Per-line state while walking a tree.
struct Run<'a> {
    path: &'a Path,
    line: &'a str,
    report: ExecutionReport,
}

impl Run<'_> {
    fn fail(&mut self, stage: Stage, node: &str, destination: Option<&str>, source: PluginError) {
        let error = RuntimeError {
            stage,
            node: node.to_string(),
            destination: destination.map(str::to_string),
            path: self.path.to_path_buf(),
            line: self.line.to_string(),
            source,
        };
        error.log();
        self.report.failures.push(error);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run one plugin call, turning a panic into an ordinary plugin error.
fn guarded<T>(call: impl FnOnce() -> Result<T, PluginError>) -> Result<T, PluginError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(PluginError::Panicked(panic_message(&*payload))),
    }
}

/// The frozen set of per-file workflow trees.
pub struct WorkflowForest {
    files: BTreeMap<PathBuf, FormatNode>,
}

impl WorkflowForest {
    pub(crate) fn new(files: BTreeMap<PathBuf, FormatNode>) -> Self {
        Self { files }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    pub fn get(&self, path: &Path) -> Option<&FormatNode> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Push one line through the tree of `path`: parse, evaluate every
    /// rule, transform for every passing rule, deliver to every endpoint.
    /// A failing node only stops its own branch.
    pub fn execute(&self, path: &Path, line: &str) -> ExecutionReport {
        let mut run = Run {
            path,
            line,
            report: ExecutionReport::new(path),
        };

        let Some(root) = self.files.get(path) else {
            run.fail(
                Stage::Lookup,
                &path.display().to_string(),
                None,
                PluginError::Invalid("no workflow is loaded for this file".into()),
            );
            return run.report.finish();
        };

        let record = match guarded(|| root.instance().parse(line)) {
            Ok(record) => record,
            Err(e) => {
                run.fail(Stage::Parse, root.class().qualified_name(), None, e);
                return run.report.finish();
            }
        };
        run.report.parsed = true;

        for rule in root.rules() {
            let record = match guarded(|| rule.instance().evaluate(&record)) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    trace!(rule = %rule.class().qualified_name(), "rule did not match");
                    continue;
                }
                Err(e) => {
                    run.fail(Stage::Rule, rule.class().qualified_name(), None, e);
                    continue;
                }
            };
            run.report.rules_passed += 1;

            for transform in rule.transforms() {
                let mut message = match guarded(|| transform.instance().transform(&record)) {
                    Ok(message) => message,
                    Err(e) => {
                        run.fail(Stage::Transform, transform.class().qualified_name(), None, e);
                        continue;
                    }
                };
                message.set_path(path);
                run.report.messages += 1;

                for endpoint in transform.endpoints() {
                    match guarded(|| endpoint.instance().send(&message)) {
                        Ok(()) => {
                            debug!(
                                endpoint = %endpoint.destination(),
                                channel = %endpoint.class().qualified_name(),
                                message_id = %message.id(),
                                "delivered"
                            );
                            run.report.delivered += 1;
                        }
                        Err(e) => run.fail(
                            Stage::Deliver,
                            endpoint.class().qualified_name(),
                            Some(endpoint.destination()),
                            e,
                        ),
                    }
                }
            }
        }

        run.report.finish()
    }

    pub fn render(&self) -> String {
        TreeView(&self.files).to_string()
    }
}

/// `├──` / `└──` rendering of per-file trees.
pub(crate) struct TreeView<'a>(pub(crate) &'a BTreeMap<PathBuf, FormatNode>);

fn branch(last: bool) -> &'static str {
    if last { "└── " } else { "├── " }
}

fn indent(last: bool) -> &'static str {
    if last { "    " } else { "│   " }
}

impl fmt::Display for TreeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (path, root) in self.0 {
            writeln!(f, "{} [{}]", path.display(), root.class().qualified_name())?;
            let rules = root.rules();
            for (i, rule) in rules.iter().enumerate() {
                let last_rule = i + 1 == rules.len();
                writeln!(f, "{}{}", branch(last_rule), rule.class().name())?;
                let transforms = rule.transforms();
                for (j, transform) in transforms.iter().enumerate() {
                    let last_transform = j + 1 == transforms.len();
                    writeln!(
                        f,
                        "{}{}{}",
                        indent(last_rule),
                        branch(last_transform),
                        transform.class().name()
                    )?;
                    let endpoints = transform.endpoints();
                    for (k, endpoint) in endpoints.iter().enumerate() {
                        writeln!(
                            f,
                            "{}{}{}{} ({})",
                            indent(last_rule),
                            indent(last_transform),
                            branch(k + 1 == endpoints.len()),
                            endpoint.destination(),
                            endpoint.class().qualified_name()
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::workflow::{WorkflowManager, test_support::*};

    fn forest(sink: &Sink, rows: &[(&str, &str, &str, &str)]) -> WorkflowForest {
        let mut manager = WorkflowManager::new(Arc::new(registry(sink)));
        manager.load_endpoint("memory", "Memory", "a", named("a")).unwrap();
        manager.load_endpoint("memory", "Memory", "b", named("b")).unwrap();
        manager.load_endpoint("memory", "Failing", "broken", Default::default()).unwrap();
        manager.load_endpoint("memory", "Panicking", "bomb", Default::default()).unwrap();
        for (format, rule, transform, endpoint) in rows {
            manager
                .load_file("/var/log/app.log", "test", format, rule, transform, endpoint)
                .unwrap();
        }
        manager.into_forest()
    }

    #[test]
    fn matching_line_reaches_every_endpoint() {
        let sink = Sink::default();
        let forest = forest(
            &sink,
            &[("Line", "Error", "Echo", "a"), ("Line", "Error", "Upper", "b")],
        );

        let report = forest.execute(Path::new("/var/log/app.log"), "ERROR disk full");
        assert!(report.is_clean());
        assert_eq!((report.rules_passed, report.messages, report.delivered), (1, 2, 2));
        assert_eq!(
            sink.take(),
            vec![("a".to_string(), "disk full".to_string()), ("b".to_string(), "DISK FULL".to_string())]
        );
    }

    #[test]
    fn rejected_rule_halts_only_its_branch() {
        let sink = Sink::default();
        let forest = forest(&sink, &[("Line", "Error", "Echo", "a"), ("Line", "Any", "Echo", "b")]);

        let report = forest.execute(Path::new("/var/log/app.log"), "INFO all good");
        assert!(report.is_clean());
        assert_eq!(report.rules_passed, 1);
        assert_eq!(sink.take(), vec![("b".to_string(), "all good".to_string())]);
    }

    #[test]
    fn failing_channel_does_not_stop_siblings() {
        let sink = Sink::default();
        let forest = forest(
            &sink,
            &[
                ("Line", "Error", "Echo", "broken"),
                ("Line", "Error", "Echo", "a"),
                ("Line", "Error", "Echo", "bomb"),
                ("Line", "Error", "Echo", "b"),
            ],
        );

        let report = forest.execute(Path::new("/var/log/app.log"), "ERROR x");
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.code() == "RUNTIME.ENDPOINT_ERROR"));
        assert_eq!(report.failures[0].destination.as_deref(), Some("broken"));
        assert!(matches!(report.failures[1].source, PluginError::Panicked(_)));
        assert_eq!(sink.take().len(), 2);
    }

    #[test]
    fn missing_template_field_fails_only_its_transform() {
        let sink = Sink::default();
        let forest = forest(&sink, &[("Line", "Error", "Ticket", "a"), ("Line", "Error", "Echo", "b")]);

        let report = forest.execute(Path::new("/var/log/app.log"), "ERROR disk full");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code(), "RUNTIME.TRANSFORM_ERROR");
        assert!(matches!(report.failures[0].source, PluginError::Template(_)));
        assert_eq!(sink.take(), vec![("b".to_string(), "disk full".to_string())]);
    }

    #[test]
    fn parse_failure_reaches_nothing() {
        let sink = Sink::default();
        let forest = forest(&sink, &[("Line", "Any", "Echo", "a")]);

        let report = forest.execute(Path::new("/var/log/app.log"), "not a leveled line");
        assert!(!report.parsed);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code(), "RUNTIME.PARSE_ERROR");
        assert_eq!((report.rules_passed, report.messages, report.delivered), (0, 0, 0));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn panicking_rule_is_isolated() {
        let sink = Sink::default();
        let forest = forest(&sink, &[("Line", "Explode", "Echo", "a"), ("Line", "Any", "Echo", "b")]);

        let report = forest.execute(Path::new("/var/log/app.log"), "WARN careful");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code(), "RUNTIME.RULE_ERROR");
        assert_eq!(sink.take(), vec![("b".to_string(), "careful".to_string())]);
    }

    #[test]
    fn unknown_path_is_reported() {
        let sink = Sink::default();
        let forest = forest(&sink, &[("Line", "Any", "Echo", "a")]);
        let report = forest.execute(Path::new("/var/log/other.log"), "ERROR x");
        assert_eq!(report.failures[0].code(), "RUNTIME.UNKNOWN_FILE");
        assert!(sink.take().is_empty());
    }

    #[test]
    fn render_draws_the_tree() {
        let sink = Sink::default();
        let forest = forest(
            &sink,
            &[("Line", "Error", "Echo", "a"), ("Line", "Error", "Echo", "b"), ("Line", "Any", "Echo", "a")],
        );
        let expected = "\
/var/log/app.log [formats.test.Line]
├── Error
│   └── Echo
│       ├── a (channels.memory.Memory)
│       └── b (channels.memory.Memory)
└── Any
    └── Echo
        └── a (channels.memory.Memory)
";
        assert_eq!(forest.render(), expected);
    }
}
