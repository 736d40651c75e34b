//! Tails the monitored log files and hands every new line to a [`LineSink`].
//!
//! Only content appended after the monitor starts is reported. The parent
//! directory of every file is watched with a `notify` poll watcher, so files
//! that do not exist yet, or that get rotated, are picked up as well.
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, info, warn};

use crate::dispatch::{LineEvent, LineSink};

/// Read position in one file plus any trailing bytes that do not form a
/// complete line yet.
#[derive(Debug, Default, Clone)]
pub struct FileCursor {
    position: u64,
    partial: Vec<u8>,
}

impl FileCursor {
    pub fn at(position: u64) -> Self {
        Self {
            position,
            partial: Vec::new(),
        }
    }

    /// Start at the current end of `path`, or at 0 if it does not exist.
    pub fn at_end(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) => Self::at(meta.len()),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "log file not readable yet, will read it from the start once it appears");
                Self::default()
            }
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.partial.clear();
    }

    /// Complete, non-blank lines appended since the last call. A file that
    /// got shorter is read again from the start.
    pub fn read_lines(&mut self, path: &Path) -> io::Result<Vec<String>> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < self.position {
            debug!(file = %path.display(), "log file was truncated");
            self.reset();
        }
        if len == self.position {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.position))?;
        let mut chunk = Vec::new();
        file.take(len - self.position).read_to_end(&mut chunk)?;
        self.position += chunk.len() as u64;
        self.partial.extend_from_slice(&chunk);

        let Some(last_newline) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        Ok(complete
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .filter(|line| !line.trim().is_empty())
            .collect())
    }
}

#[derive(Debug)]
struct WatchedFile {
    path: PathBuf,
    dir: PathBuf,
    name: PathBuf,
    cursor: FileCursor,
}

impl WatchedFile {
    fn new(path: PathBuf) -> Self {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = path.file_name().map(PathBuf::from).unwrap_or_default();
        let cursor = FileCursor::at_end(&path);
        Self {
            path,
            dir,
            name,
            cursor,
        }
    }

    fn matches(&self, event_path: &Path) -> bool {
        event_path == self.path
            || (event_path.file_name() == Some(self.name.as_os_str())
                && event_path.parent() == Some(self.dir.as_path()))
    }
}

pub struct LogMonitor {
    files: Vec<WatchedFile>,
    poll_interval: Duration,
}

impl LogMonitor {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>, poll_interval: Duration) -> Self {
        let files = paths.into_iter().map(WatchedFile::new).collect();
        Self {
            files,
            poll_interval,
        }
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }

    fn directories(&self) -> BTreeSet<PathBuf> {
        self.files.iter().map(|f| f.dir.clone()).collect()
    }

    /// Read every file once. Returns the number of lines pushed.
    pub async fn scan(&mut self, sink: &dyn LineSink) -> usize {
        let mut pushed = 0;
        for file in &mut self.files {
            pushed += forward(file, sink).await;
        }
        pushed
    }

    async fn on_change(&mut self, event_path: &Path, sink: &dyn LineSink) -> usize {
        let mut pushed = 0;
        for file in self.files.iter_mut().filter(|f| f.matches(event_path)) {
            pushed += forward(file, sink).await;
        }
        pushed
    }

    fn on_remove(&mut self, event_path: &Path) {
        for file in self.files.iter_mut().filter(|f| f.matches(event_path)) {
            debug!(file = %file.path.display(), "log file removed");
            file.cursor.reset();
        }
    }

    /// Watch until the future is dropped.
    pub async fn run(mut self, sink: Arc<dyn LineSink>) -> Result<()> {
        let (tx, mut rx): (_, UnboundedReceiver<notify::Result<Event>>) = unbounded_channel();
        let mut watcher = PollWatcher::new(
            move |res| {
                // nobody is listening once `rx` is gone
                let _ = tx.send(res);
            },
            // mtime has one-second granularity on many filesystems
            Config::default()
                .with_poll_interval(self.poll_interval)
                .with_compare_contents(true),
        )
        .context("failed to create file watcher")?;

        for dir in self.directories() {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("failed to watch {}", dir.display()))?;
            info!(dir = %dir.display(), "watching directory");
        }

        // catch anything written between startup and the first poll
        self.scan(sink.as_ref()).await;

        while let Some(res) = rx.recv().await {
            match res {
                Ok(Event {
                    kind: EventKind::Create(_) | EventKind::Modify(_),
                    paths,
                    ..
                }) => {
                    for path in paths {
                        self.on_change(&path, sink.as_ref()).await;
                    }
                }
                Ok(Event {
                    kind: EventKind::Remove(_),
                    paths,
                    ..
                }) => {
                    for path in paths {
                        self.on_remove(&path);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(?e, "watcher error"),
            }
        }
        bail!("file watcher stopped")
    }
}

async fn forward(file: &mut WatchedFile, sink: &dyn LineSink) -> usize {
    let lines = match file.cursor.read_lines(&file.path) {
        Ok(lines) => lines,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(file = %file.path.display(), error = %e, "failed to read log file");
            return 0;
        }
    };
    let mut pushed = 0;
    for line in lines {
        if let Err(e) = sink.push(LineEvent::new(file.path.clone(), line)).await {
            warn!(file = %file.path.display(), error = %e, "dropping line");
            continue;
        }
        pushed += 1;
    }
    pushed
}
