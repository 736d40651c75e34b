//! Compiled-in plugin modules.
pub mod discord;
pub mod file;
pub mod http;
pub mod pacman;
pub mod smtp;
pub mod telegram;
pub mod twilio_sms;

use super::{ClassDef, PluginModule};

pub fn format_modules() -> Vec<PluginModule> {
    vec![pacman::module()]
}

pub fn channel_modules() -> Vec<PluginModule> {
    vec![
        PluginModule::new("file").class(ClassDef::channel::<file::File>("File")),
        PluginModule::new("smtp").class(ClassDef::channel::<smtp::Smtp>("SMTP")),
        PluginModule::new("telegram").class(ClassDef::channel::<telegram::Telegram>("Telegram")),
        PluginModule::new("twilio_sms")
            .class(ClassDef::channel::<twilio_sms::TwilioSms>("TwilioSMS")),
        PluginModule::new("discord").class(ClassDef::channel::<discord::Discord>("Discord")),
    ]
}
