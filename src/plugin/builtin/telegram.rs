use serde::Serialize;
use tracing::debug;

use crate::{
    message::Message,
    plugin::{Channel, ChannelSpec, PluginError, Vars, var},
};

use super::http::{DEFAULT_TIMEOUT, LazyClient, check_status};

const API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Posts messages to a chat through the Telegram Bot API.
#[derive(Debug)]
pub struct Telegram {
    chat_id: String,
    token: String,
    client: LazyClient,
}

impl Telegram {
    fn endpoint(&self) -> String {
        format!("{API_URL}/bot{}/sendMessage", self.token)
    }
}

impl ChannelSpec for Telegram {
    const REQUIRED_VARS: &'static [&'static str] = &["chat_id", "token"];

    fn from_vars(_destination: &str, vars: &Vars) -> Result<Self, PluginError> {
        Ok(Self {
            chat_id: var(vars, "chat_id")?.to_string(),
            token: var(vars, "token")?.to_string(),
            client: LazyClient::new(DEFAULT_TIMEOUT),
        })
    }
}

/// The subject, when present, becomes a first paragraph.
fn text(message: &Message) -> String {
    match message.subject() {
        Some(subject) => format!("{subject}\n\n{}", message.body()),
        None => message.body(),
    }
}

impl Channel for Telegram {
    fn send(&self, message: &Message) -> Result<(), PluginError> {
        let text = text(message);
        debug!(chat_id = %self.chat_id, "sending telegram message");
        let response = self
            .client
            .get()?
            .post(self.endpoint())
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: &text,
            })
            .send()?;
        check_status("telegram", response)
    }
}
