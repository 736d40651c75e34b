use lettre::{
    Message as Email, SmtpTransport, Transport,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::debug;

use crate::{
    message::Message,
    plugin::{Channel, ChannelSpec, PluginError, Vars, var},
};

use super::http::timeout_var;

/// Mails the message over implicit TLS (SMTPS), logging in first.
#[derive(Debug)]
pub struct Smtp {
    transport: SmtpTransport,
    sender: Mailbox,
    recipient: Mailbox,
}

fn mailbox(vars: &Vars, name: &str) -> Result<Mailbox, PluginError> {
    let raw = var(vars, name)?;
    raw.parse().map_err(|e| PluginError::InvalidVar {
        name: name.to_string(),
        reason: format!("'{raw}' is not a mail address: {e}"),
    })
}

impl Smtp {
    fn email(&self, message: &Message) -> Result<Email, PluginError> {
        let mut builder = Email::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .header(ContentType::TEXT_PLAIN);
        if let Some(subject) = message.subject() {
            builder = builder.subject(subject);
        }
        builder
            .body(message.body())
            .map_err(|e| PluginError::Delivery(format!("could not build mail: {e}")))
    }
}

impl ChannelSpec for Smtp {
    const REQUIRED_VARS: &'static [&'static str] = &[
        "ip",
        "port",
        "username",
        "password",
        "sender",
        "recipient",
        "timeout",
    ];

    fn from_vars(_destination: &str, vars: &Vars) -> Result<Self, PluginError> {
        let host = var(vars, "ip")?;
        let raw_port = var(vars, "port")?;
        let port: u16 = raw_port.trim().parse().map_err(|_| PluginError::InvalidVar {
            name: "port".to_string(),
            reason: format!("'{raw_port}' is not a port number"),
        })?;
        let credentials = Credentials::new(
            var(vars, "username")?.to_string(),
            var(vars, "password")?.to_string(),
        );

        // no connection is made until the first send
        let transport = SmtpTransport::relay(host)
            .map_err(|e| PluginError::InvalidVar {
                name: "ip".to_string(),
                reason: e.to_string(),
            })?
            .port(port)
            .credentials(credentials)
            .timeout(Some(timeout_var(vars)?))
            .build();

        Ok(Self {
            transport,
            sender: mailbox(vars, "sender")?,
            recipient: mailbox(vars, "recipient")?,
        })
    }
}

impl Channel for Smtp {
    fn send(&self, message: &Message) -> Result<(), PluginError> {
        let email = self.email(message)?;
        debug!(recipient = %self.recipient, "sending mail");
        self.transport
            .send(&email)
            .map(|_| ())
            .map_err(|e| PluginError::Delivery(format!("smtp: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vars {
        [
            ("ip", "smtp.example.com"),
            ("port", "465"),
            ("username", "alerts"),
            ("password", "secret"),
            ("sender", "sendlog <alerts@example.com>"),
            ("recipient", "ops@example.com"),
            ("timeout", "5"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn builds_without_connecting() {
        let smtp = Smtp::from_vars("ops", &vars()).unwrap();
        assert_eq!(smtp.sender.email.to_string(), "alerts@example.com");
        assert_eq!(smtp.recipient.email.to_string(), "ops@example.com");
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut vars = vars();
        vars.insert("port".into(), "smtps".into());
        let err = Smtp::from_vars("ops", &vars).unwrap_err();
        assert!(matches!(err, PluginError::InvalidVar { name, .. } if name == "port"));
    }

    #[test]
    fn bad_address_is_rejected() {
        let mut vars = vars();
        vars.insert("recipient".into(), "not an address".into());
        let err = Smtp::from_vars("ops", &vars).unwrap_err();
        assert!(matches!(err, PluginError::InvalidVar { name, .. } if name == "recipient"));
    }

    #[test]
    fn mail_carries_subject_and_body() {
        let smtp = Smtp::from_vars("ops", &vars()).unwrap();
        let email = smtp
            .email(&Message::with_subject("nginx 502", "upstream down"))
            .unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Subject: nginx 502"));
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("upstream down"));
    }
}
