//! `formats.pacman`: the Arch Linux package manager log.
//!
//! ```text
//! [2025-03-28T14:32:59+0000] [PACMAN] Running 'pacman -Syu'
//! [2025-03-28T14:33:10+0000] [ALPM] upgraded linux (6.13.7-1 -> 6.13.8-1)
//! [2025-03-28T14:33:12+0000] [ALPM] installed htop (3.4.0-1)
//! ```
use crate::{
    message::Message,
    plugin::{
        ClassDef, PluginError, PluginModule,
        pattern::{PatternFormat, PatternRule, TemplateTransform},
    },
    record::Record,
};

pub const LINE: &str = r"^\[(?P<ts>.*?)\] \[(?P<app>.*?)\] (?P<msg>.*)$";
pub const RUN_COMMAND: &str = r"Running\s+'(?P<command>[^']+)'";
pub const UPGRADED: &str = r"^upgraded (?P<package>\S+) \((?P<from>[^)]+?) -> (?P<to>[^)]+)\)";
pub const INSTALLED: &str = r"^installed (?P<package>\S+) \((?P<version>[^)]+)\)";

/// The message part of the line, as pacman wrote it.
fn human(record: &Record) -> Result<Message, PluginError> {
    record
        .get_str("msg")
        .map(Message::text)
        .ok_or_else(|| PluginError::MissingField("msg".into()))
}

fn summary(record: &Record) -> Result<Message, PluginError> {
    let command = record
        .get_str("command")
        .ok_or_else(|| PluginError::MissingField("command".into()))?;
    let ts = record.get_str("ts").unwrap_or("an unknown time");
    Ok(Message::text(format!("Command '{command}' detected at {ts}.")))
}

pub fn module() -> PluginModule {
    PluginModule::new("pacman").class(
        ClassDef::format("Pacman", || PatternFormat::new(Some(LINE)))
            .member(
                ClassDef::rule("RunCommand", || PatternRule::new(Some("msg"), RUN_COMMAND))
                    .member(ClassDef::transform("Human", || Ok(human)))
                    .member(ClassDef::transform("Summary", || Ok(summary))),
            )
            .member(
                ClassDef::rule("Upgraded", || PatternRule::new(Some("msg"), UPGRADED)).member(
                    ClassDef::transform("Human", || {
                        TemplateTransform::new("{{package}} upgraded from {{from}} to {{to}}", None)
                    }),
                ),
            )
            .member(
                ClassDef::rule("Installed", || PatternRule::new(Some("msg"), INSTALLED)).member(
                    ClassDef::transform("Human", || {
                        TemplateTransform::new("{{package}} {{version}} installed", None)
                    }),
                ),
            ),
    )
}
