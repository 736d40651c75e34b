use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Outbound alert produced by a Transform and handed to every Channel under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    path: Option<PathBuf>,
    payload: Value,
}

impl Message {
    pub fn new(payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: None,
            payload,
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(Value::String(body.into()))
    }

    pub fn with_subject(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(json!({ "subject": subject.into(), "body": body.into() }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The log file the alert originated from, set by the execution engine.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// String payloads as-is, the `body` member of object payloads,
    /// compact JSON for anything else.
    pub fn body(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("body") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => self.payload.to_string(),
            },
            other => other.to_string(),
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.payload.get("subject").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_body() {
        let msg = Message::text("disk almost full");
        assert_eq!(msg.body(), "disk almost full");
        assert_eq!(msg.subject(), None);
        assert!(!msg.id().is_empty());
    }

    #[test]
    fn subject_message() {
        let msg = Message::with_subject("nginx 502", "502 on GET /");
        assert_eq!(msg.subject(), Some("nginx 502"));
        assert_eq!(msg.body(), "502 on GET /");
    }

    #[test]
    fn structured_payload_falls_back_to_json() {
        let msg = Message::new(json!({"count": 3}));
        assert_eq!(msg.body(), r#"{"count":3}"#);
    }

    #[test]
    fn origin_path() {
        let mut msg = Message::text("x");
        assert_eq!(msg.path(), None);
        msg.set_path("/var/log/pacman.log");
        assert_eq!(msg.path(), Some(&PathBuf::from("/var/log/pacman.log")));
    }
}
