use std::{fs::OpenOptions, io::Write, path::PathBuf};

use crate::{
    message::Message,
    plugin::{Channel, ChannelSpec, PluginError, Vars, var},
};

/// Appends each message body as one line to a local file.
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ChannelSpec for File {
    const REQUIRED_VARS: &'static [&'static str] = &["path"];

    fn from_vars(_destination: &str, vars: &Vars) -> Result<Self, PluginError> {
        let path = var(vars, "path")?;
        if path.trim().is_empty() {
            return Err(PluginError::InvalidVar {
                name: "path".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(Self::new(path))
    }
}

impl Channel for File {
    fn send(&self, message: &Message) -> Result<(), PluginError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", message.body())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alerts.log");
        let vars = Vars::from([("path".to_string(), path.display().to_string())]);
        let channel = File::from_vars("ops", &vars).unwrap();

        channel.send(&Message::text("first")).unwrap();
        channel.send(&Message::with_subject("s", "second")).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn missing_directory_is_a_delivery_error() {
        let dir = tempdir().unwrap();
        let channel = File::new(dir.path().join("nope").join("alerts.log"));
        assert!(matches!(
            channel.send(&Message::text("x")),
            Err(PluginError::Io(_))
        ));
    }
}
