//! The queue between the log monitor and the workflow forest.
//!
//! Any number of producers push [`LineEvent`]s; a single consumer on the
//! blocking pool runs every line through the forest to completion before it
//! takes the next one, so channels may block on network I/O.
use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Error, anyhow};
use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::workflow::WorkflowForest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    pub path: PathBuf,
    pub line: String,
}

impl LineEvent {
    pub fn new(path: impl Into<PathBuf>, line: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: line.into(),
        }
    }
}

/// Where producers hand their lines to.
#[async_trait]
pub trait LineSink: Send + Sync {
    async fn push(&self, event: LineEvent) -> Result<(), Error>;
}

/// Producer side of the dispatch queue. Cheap to clone; the consumer stops
/// once every handle is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub enum DispatchHandle {
    Bounded(mpsc::Sender<LineEvent>),
    Unbounded(mpsc::UnboundedSender<LineEvent>),
}

#[async_trait]
impl LineSink for DispatchHandle {
    async fn push(&self, event: LineEvent) -> Result<(), Error> {
        match self {
            DispatchHandle::Bounded(tx) => tx
                .send(event)
                .await
                .map_err(|_| anyhow!("dispatch queue is closed")),
            DispatchHandle::Unbounded(tx) => tx
                .send(event)
                .map_err(|_| anyhow!("dispatch queue is closed")),
        }
    }
}

enum Queue {
    Bounded(mpsc::Receiver<LineEvent>),
    Unbounded(mpsc::UnboundedReceiver<LineEvent>),
}

impl Queue {
    fn blocking_recv(&mut self) -> Option<LineEvent> {
        match self {
            Queue::Bounded(rx) => rx.blocking_recv(),
            Queue::Unbounded(rx) => rx.blocking_recv(),
        }
    }
}

pub struct Dispatcher {
    worker: JoinHandle<usize>,
}

impl Dispatcher {
    /// Start the consumer. `capacity` bounds the queue (producers wait when
    /// it is full); `None` or `Some(0)` makes it unbounded.
    pub fn spawn(forest: Arc<WorkflowForest>, capacity: Option<usize>) -> (Self, DispatchHandle) {
        let (handle, queue) = match capacity.filter(|c| *c > 0) {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                (DispatchHandle::Bounded(tx), Queue::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (DispatchHandle::Unbounded(tx), Queue::Unbounded(rx))
            }
        };
        info!(capacity = ?capacity, files = forest.len(), "dispatcher started");
        let worker = tokio::task::spawn_blocking(move || consume(&forest, queue));
        (Self { worker }, handle)
    }

    /// Wait for the consumer to drain the queue. Every [`DispatchHandle`]
    /// must be dropped first. Returns the number of lines processed.
    pub async fn shutdown(self) -> Result<usize, Error> {
        let processed = self.worker.await.context("dispatch worker failed")?;
        info!(processed, "dispatcher stopped");
        Ok(processed)
    }
}

fn consume(forest: &WorkflowForest, mut queue: Queue) -> usize {
    let mut processed = 0;
    while let Some(event) = queue.blocking_recv() {
        let report = forest.execute(&event.path, &event.line);
        processed += 1;
        if report.is_clean() {
            debug!(
                file = %event.path.display(),
                rules = report.rules_passed,
                messages = report.messages,
                delivered = report.delivered,
                elapsed_ms = report.total.num_milliseconds(),
                "line processed"
            );
        } else {
            warn!(
                file = %event.path.display(),
                failures = report.failures.len(),
                delivered = report.delivered,
                "line processed with failures"
            );
        }
    }
    processed
}
