//! Generic, data-driven plugins: regex formats and rules, and Handlebars
//! transforms. The pacman module and declarative YAML modules are built
//! from these.
use handlebars::Handlebars;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::{message::Message, record::Record};

use super::{Format, PluginError, Rule, Transform};

/// Named capture groups as JSON strings. Groups that did not take part in
/// the match are `null`.
fn captures_to_map(pattern: &Regex, captures: &Captures<'_>) -> Map<String, Value> {
    pattern
        .capture_names()
        .flatten()
        .map(|name| {
            let value = captures
                .name(name)
                .map(|m| Value::String(m.as_str().to_string()))
                .unwrap_or(Value::Null);
            (name.to_string(), value)
        })
        .collect()
}

/// Splits a line into fields with a regex. Without a pattern every line
/// is passed on raw.
#[derive(Debug, Clone)]
pub struct PatternFormat {
    pattern: Option<Regex>,
}

impl PatternFormat {
    pub fn new(pattern: Option<&str>) -> Result<Self, PluginError> {
        let pattern = pattern.map(Regex::new).transpose()?;
        Ok(Self { pattern })
    }

    pub fn passthrough() -> Self {
        Self { pattern: None }
    }
}

impl Format for PatternFormat {
    fn parse(&self, line: &str) -> Result<Record, PluginError> {
        let Some(pattern) = &self.pattern else {
            return Ok(Record::raw(line));
        };
        let captures = pattern.captures(line).ok_or_else(|| PluginError::NoMatch {
            pattern: pattern.as_str().to_string(),
        })?;
        Ok(Record::with_fields(line, captures_to_map(pattern, &captures)))
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Pattern(Regex),
    Contains(String),
}

/// Matches a field (or the raw line) against a regex or a substring.
/// Named regex captures are added to the record context.
#[derive(Debug, Clone)]
pub struct PatternRule {
    field: Option<String>,
    matcher: Matcher,
}

impl PatternRule {
    pub fn new(field: Option<&str>, pattern: &str) -> Result<Self, PluginError> {
        Ok(Self {
            field: field.map(str::to_string),
            matcher: Matcher::Pattern(Regex::new(pattern)?),
        })
    }

    pub fn contains(field: Option<&str>, needle: impl Into<String>) -> Self {
        Self {
            field: field.map(str::to_string),
            matcher: Matcher::Contains(needle.into()),
        }
    }

    fn target<'r>(&self, record: &'r Record) -> Result<Option<&'r str>, PluginError> {
        match &self.field {
            None => Ok(Some(record.line())),
            Some(field) if record.contains(field) => Ok(record.get_str(field)),
            Some(field) => Err(PluginError::MissingField(field.clone())),
        }
    }
}

impl Rule for PatternRule {
    fn evaluate(&self, record: &Record) -> Result<Option<Record>, PluginError> {
        // null or non-string values never match
        let Some(target) = self.target(record)? else {
            return Ok(None);
        };
        match &self.matcher {
            Matcher::Contains(needle) => Ok(target.contains(needle.as_str()).then(|| record.clone())),
            Matcher::Pattern(pattern) => {
                let Some(captures) = pattern.captures(target) else {
                    return Ok(None);
                };
                let mut augmented = record.clone();
                for (key, value) in captures_to_map(pattern, &captures) {
                    augmented.insert_context(key, value);
                }
                Ok(Some(augmented))
            }
        }
    }
}

const BODY: &str = "body";
const SUBJECT: &str = "subject";

/// Renders a Handlebars template against [`Record::to_template_data`].
/// With a subject template the message payload is `{subject, body}`.
pub struct TemplateTransform {
    templates: Handlebars<'static>,
    with_subject: bool,
}

impl TemplateTransform {
    pub fn new(body: &str, subject: Option<&str>) -> Result<Self, PluginError> {
        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);
        templates.set_strict_mode(true);
        templates
            .register_template_string(BODY, body)
            .map_err(|e| PluginError::Template(e.to_string()))?;
        if let Some(subject) = subject {
            templates
                .register_template_string(SUBJECT, subject)
                .map_err(|e| PluginError::Template(e.to_string()))?;
        }
        Ok(Self {
            templates,
            with_subject: subject.is_some(),
        })
    }

    fn render(&self, name: &str, data: &Value) -> Result<String, PluginError> {
        self.templates
            .render(name, data)
            .map_err(|e| PluginError::Template(e.to_string()))
    }
}

impl Transform for TemplateTransform {
    fn transform(&self, record: &Record) -> Result<Message, PluginError> {
        let data = record.to_template_data();
        let body = self.render(BODY, &data)?;
        if self.with_subject {
            Ok(Message::with_subject(self.render(SUBJECT, &data)?, body))
        } else {
            Ok(Message::text(body))
        }
    }
}
