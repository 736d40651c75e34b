use tracing::debug;

use crate::{
    message::Message,
    plugin::{Channel, ChannelSpec, PluginError, Vars, var},
};

use super::http::{LazyClient, check_status, timeout_var};

const API_URL: &str = "https://api.twilio.com/2010-04-01";

/// Sends an SMS through the Twilio Messages REST API.
#[derive(Debug)]
pub struct TwilioSms {
    account_sid: String,
    auth_token: String,
    sender: String,
    recipient: String,
    client: LazyClient,
}

impl ChannelSpec for TwilioSms {
    const REQUIRED_VARS: &'static [&'static str] =
        &["account_sid", "auth_token", "sender", "recipient", "timeout"];

    fn from_vars(_destination: &str, vars: &Vars) -> Result<Self, PluginError> {
        Ok(Self {
            account_sid: var(vars, "account_sid")?.to_string(),
            auth_token: var(vars, "auth_token")?.to_string(),
            sender: var(vars, "sender")?.to_string(),
            recipient: var(vars, "recipient")?.to_string(),
            client: LazyClient::new(timeout_var(vars)?),
        })
    }
}

impl Channel for TwilioSms {
    fn send(&self, message: &Message) -> Result<(), PluginError> {
        let url = format!("{API_URL}/Accounts/{}/Messages.json", self.account_sid);
        let body = message.body();
        debug!(recipient = %self.recipient, "sending sms");
        let response = self
            .client
            .get()?
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", self.recipient.as_str()),
                ("From", self.sender.as_str()),
                ("Body", body.as_str()),
            ])
            .send()?;
        check_status("twilio", response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn vars(timeout: &str) -> Vars {
        [
            ("account_sid", "AC123"),
            ("auth_token", "secret"),
            ("sender", "+15550001"),
            ("recipient", "+15550002"),
            ("timeout", timeout),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn builds_from_vars() {
        let sms = TwilioSms::from_vars("oncall", &vars("5")).unwrap();
        assert_eq!(sms.client.timeout(), Duration::from_secs(5));
        assert_eq!(sms.recipient, "+15550002");
    }

    #[test]
    fn bad_timeout_fails_construction() {
        assert!(TwilioSms::from_vars("oncall", &vars("later")).is_err());
    }
}
