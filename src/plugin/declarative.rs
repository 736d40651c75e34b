//! Format modules described in YAML instead of code.
//!
//! Every `<plugin_dir>/formats/<module>.yml` file becomes `formats.<module>`:
//!
//! ```yaml
//! Nginx:
//!   pattern: '^(?P<ip>\S+) .* "(?P<method>\S+) (?P<path>\S+) \S+" (?P<status>\d{3})'
//!   rules:
//!     ServerError:
//!       field: status
//!       pattern: '^5\d\d$'
//!       transforms:
//!         Human:
//!           template: "{{status}} on {{method}} {{path}} from {{ip}}"
//! ```
//!
//! Patterns and templates are compiled once while loading so that a broken
//! module is reported at startup, not on the first matching line.
use std::{fs, path::Path};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{error::WorkflowError, util::ordered_map};

use super::{
    ClassDef, Namespace, PluginModule, PluginRegistry,
    pattern::{PatternFormat, PatternRule, TemplateTransform},
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FormatDef {
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default, deserialize_with = "ordered_map")]
    rules: Vec<(String, RuleDef)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDef {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    contains: Option<String>,
    #[serde(default, deserialize_with = "ordered_map")]
    transforms: Vec<(String, TransformDef)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransformDef {
    template: String,
    #[serde(default)]
    subject: Option<String>,
}

fn invalid(module: &str, reason: impl Into<String>) -> WorkflowError {
    WorkflowError::InvalidModule {
        module: format!("formats.{module}"),
        reason: reason.into(),
    }
}

fn format_class(module: &str, name: String, def: FormatDef) -> Result<ClassDef, WorkflowError> {
    PatternFormat::new(def.pattern.as_deref())
        .map_err(|e| invalid(module, format!("{name}: {e}")))?;
    let pattern = def.pattern;
    let mut class = ClassDef::format(name.clone(), move || PatternFormat::new(pattern.as_deref()));
    for (rule_name, rule) in def.rules {
        class = class.member(rule_class(module, &name, rule_name, rule)?);
    }
    Ok(class)
}

fn rule_class(
    module: &str,
    parent: &str,
    name: String,
    def: RuleDef,
) -> Result<ClassDef, WorkflowError> {
    let field = def.field;
    let mut class = match (def.pattern, def.contains) {
        (Some(pattern), None) => {
            PatternRule::new(field.as_deref(), &pattern)
                .map_err(|e| invalid(module, format!("{parent}.{name}: {e}")))?;
            ClassDef::rule(name.clone(), move || PatternRule::new(field.as_deref(), &pattern))
        }
        (None, Some(needle)) => ClassDef::rule(name.clone(), move || {
            Ok(PatternRule::contains(field.as_deref(), needle.clone()))
        }),
        _ => {
            return Err(invalid(
                module,
                format!("{parent}.{name}: a rule needs exactly one of 'pattern' or 'contains'"),
            ));
        }
    };
    for (transform_name, transform) in def.transforms {
        TemplateTransform::new(&transform.template, transform.subject.as_deref())
            .map_err(|e| invalid(module, format!("{parent}.{name}.{transform_name}: {e}")))?;
        let TransformDef { template, subject } = transform;
        class = class.member(ClassDef::transform(transform_name, move || {
            TemplateTransform::new(&template, subject.as_deref())
        }));
    }
    Ok(class)
}

/// Build a format module from the contents of one YAML file.
pub fn parse_module(name: &str, contents: &str) -> Result<PluginModule, WorkflowError> {
    let classes: Vec<(String, FormatDef)> = {
        #[derive(Deserialize)]
        struct Doc(#[serde(deserialize_with = "ordered_map")] Vec<(String, FormatDef)>);
        serde_yaml_bw::from_str::<Doc>(contents)
            .map_err(|e| invalid(name, e.to_string()))?
            .0
    };
    if classes.is_empty() {
        return Err(invalid(name, "no format class is defined"));
    }
    let mut module = PluginModule::new(name);
    for (class_name, def) in classes {
        module = module.class(format_class(name, class_name, def)?);
    }
    Ok(module)
}

/// Register every `formats/*.yml` (or `.yaml`) module found under `plugin_dir`.
/// Returns the number of modules registered. A missing directory is not an error.
pub fn load_dir(registry: &PluginRegistry, plugin_dir: &Path) -> Result<usize, WorkflowError> {
    let formats = plugin_dir.join("formats");
    let entries = match fs::read_dir(&formats) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %formats.display(), error = %e, "no declarative format modules loaded");
            return Ok(0);
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                )
        })
        .collect();
    paths.sort();

    let mut loaded = 0;
    for path in paths {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let contents = fs::read_to_string(&path).map_err(|e| invalid(name, e.to_string()))?;
        let module = parse_module(name, &contents)?;
        let key = registry.register_module(Namespace::Formats, module);
        info!(module = %key, file = %path.display(), "loaded declarative format module");
        loaded += 1;
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Format, PluginRole, Rule, Transform};
    use tempfile::tempdir;

    const NGINX: &str = r#"
Nginx:
  pattern: '^(?P<ip>\S+) .* "(?P<method>\S+) (?P<path>\S+) \S+" (?P<status>\d{3})'
  rules:
    ServerError:
      field: status
      pattern: '^5\d\d$'
      transforms:
        Human:
          template: "{{status}} on {{method}} {{path}} from {{ip}}"
          subject: "nginx {{status}}"
    Bots:
      contains: "Googlebot"
      transforms:
        Raw:
          template: "{{line}}"
"#;

    const LINE: &str =
        r#"10.0.0.7 - - [28/Mar/2025:14:32:59 +0000] "GET /api/users HTTP/1.1" 502 157 "-" "curl""#;

    #[test]
    fn declarative_module_runs_end_to_end() {
        let registry = PluginRegistry::new();
        registry.register_module(Namespace::Formats, parse_module("nginx", NGINX).unwrap());

        let format = registry
            .resolve(Namespace::Formats, "nginx", "Nginx", PluginRole::Format)
            .unwrap();
        let rule = PluginRegistry::resolve_member(&format, "ServerError", PluginRole::Rule).unwrap();
        let transform = PluginRegistry::resolve_member(&rule, "Human", PluginRole::Transform).unwrap();
        assert_eq!(transform.qualified_name(), "formats.nginx.Nginx.ServerError.Human");

        let record = format.new_format().unwrap().parse(LINE).unwrap();
        let record = rule.new_rule().unwrap().evaluate(&record).unwrap().unwrap();
        let message = transform.new_transform().unwrap().transform(&record).unwrap();
        assert_eq!(message.subject(), Some("nginx 502"));
        assert_eq!(message.body(), "502 on GET /api/users from 10.0.0.7");
    }

    #[test]
    fn rule_order_is_kept() {
        let module = parse_module("nginx", NGINX).unwrap();
        let registry = PluginRegistry::new();
        registry.register_module(Namespace::Formats, module);
        let format = registry
            .resolve(Namespace::Formats, "nginx", "Nginx", PluginRole::Format)
            .unwrap();
        let names: Vec<&str> = format.members().iter().map(|m| m.name()).collect();
        assert_eq!(names, ["ServerError", "Bots"]);
    }

    #[test]
    fn broken_pattern_is_reported_at_load() {
        let err = parse_module("bad", "Bad:\n  pattern: '(unclosed'\n").unwrap_err();
        assert_eq!(err.code(), "WORKFLOW.INVALID_MODULE");
        assert!(err.to_string().contains("formats.bad"));
    }

    #[test]
    fn rule_needs_a_matcher() {
        let yaml = "Plain:\n  rules:\n    Any:\n      field: msg\n";
        assert!(parse_module("plain", yaml).is_err());
    }

    #[test]
    fn load_dir_registers_yaml_files() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("formats")).unwrap();
        fs::write(dir.path().join("formats").join("nginx.yml"), NGINX).unwrap();
        fs::write(dir.path().join("formats").join("notes.txt"), "ignored").unwrap();

        let registry = PluginRegistry::new();
        assert_eq!(load_dir(&registry, dir.path()).unwrap(), 1);
        assert_eq!(registry.modules(), ["formats.nginx"]);
    }

    #[test]
    fn missing_dir_loads_nothing() {
        let dir = tempdir().unwrap();
        let registry = PluginRegistry::new();
        assert_eq!(load_dir(&registry, &dir.path().join("absent")).unwrap(), 0);
    }
}
