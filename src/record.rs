use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A log line after it went through a Format, plus whatever the rules
/// on its way captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    line: String,
    fields: Map<String, Value>,
    context: Map<String, Value>,
}

impl Record {
    /// A record carrying only the raw line, for formats without a pattern.
    pub fn raw(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            ..Default::default()
        }
    }

    pub fn with_fields(line: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            line: line.into(),
            fields,
            context: Map::new(),
        }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn is_structured(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.context.contains_key(key) || self.fields.contains_key(key)
    }

    /// Context wins over fields.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key).or_else(|| self.fields.get(key))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn insert_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    /// Flattened view used by templates: fields, then context on top, plus
    /// `line` and a nested `context` object.
    pub fn to_template_data(&self) -> Value {
        let mut data = self.fields.clone();
        for (key, value) in &self.context {
            data.insert(key.clone(), value.clone());
        }
        data.entry("line")
            .or_insert_with(|| Value::String(self.line.clone()));
        data.insert("context".to_string(), Value::Object(self.context.clone()));
        Value::Object(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pacman() -> Record {
        let mut fields = Map::new();
        fields.insert("ts".into(), json!("2025-03-28T14:32:59+0000"));
        fields.insert("msg".into(), json!("Running 'pacman -Syu'"));
        Record::with_fields("[2025-03-28T14:32:59+0000] [PACMAN] Running 'pacman -Syu'", fields)
    }

    #[test]
    fn context_shadows_fields() {
        let mut record = pacman();
        record.insert_context("msg", json!("shadowed"));
        assert_eq!(record.get_str("msg"), Some("shadowed"));
        assert_eq!(record.fields()["msg"], json!("Running 'pacman -Syu'"));
    }

    #[test]
    fn template_data_is_flat_with_nested_context() {
        let mut record = pacman();
        record.insert_context("command", json!("pacman -Syu"));
        let data = record.to_template_data();
        assert_eq!(data["command"], json!("pacman -Syu"));
        assert_eq!(data["ts"], json!("2025-03-28T14:32:59+0000"));
        assert_eq!(data["context"], json!({"command": "pacman -Syu"}));
        assert_eq!(data["line"], json!(record.line()));
    }

    #[test]
    fn raw_record_is_unstructured() {
        let record = Record::raw("plain text");
        assert!(!record.is_structured());
        assert_eq!(record.get("line"), None);
        assert_eq!(record.to_template_data()["line"], json!("plain text"));
    }
}
