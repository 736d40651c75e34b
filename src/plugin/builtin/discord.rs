use serde::Serialize;

use crate::{
    message::Message,
    plugin::{Channel, ChannelSpec, PluginError, Vars, var},
};

use super::http::{LazyClient, check_status, timeout_var};

/// Discord caps webhook `content` at 2000 characters.
const MAX_CONTENT: usize = 2000;

#[derive(Debug, Serialize)]
struct WebhookMessage {
    content: String,
}

/// Posts plain-text messages to a Discord webhook.
#[derive(Debug)]
pub struct Discord {
    webhook_url: String,
    client: LazyClient,
}

fn content(message: &Message) -> String {
    let text = match message.subject() {
        Some(subject) => format!("**{subject}**\n{}", message.body()),
        None => message.body(),
    };
    text.chars().take(MAX_CONTENT).collect()
}

impl ChannelSpec for Discord {
    const REQUIRED_VARS: &'static [&'static str] = &["webhook_url", "timeout"];

    fn from_vars(_destination: &str, vars: &Vars) -> Result<Self, PluginError> {
        let webhook_url = var(vars, "webhook_url")?;
        if !webhook_url.starts_with("https://") && !webhook_url.starts_with("http://") {
            return Err(PluginError::InvalidVar {
                name: "webhook_url".into(),
                reason: format!("'{webhook_url}' is not an http(s) url"),
            });
        }
        Ok(Self {
            webhook_url: webhook_url.to_string(),
            client: LazyClient::new(timeout_var(vars)?),
        })
    }
}

impl Channel for Discord {
    fn send(&self, message: &Message) -> Result<(), PluginError> {
        let response = self
            .client
            .get()?
            .post(&self.webhook_url)
            .json(&WebhookMessage {
                content: content(message),
            })
            .send()?;
        check_status("discord", response)
    }
}
