use anyhow::Result;
use log::error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

use activity_core::aggregator::{EventProcessor, StreamingAggregator};
use activity_core::event::ActivityEvent;
use activity_core::sink::ResultSink;

/// Feeds a `StreamingAggregator` and writes its ranking through a `ResultSink`
/// every `every` processed events. `every == 0` disables periodic writes.
///
/// Inside a tokio runtime periodic writes run on the blocking pool, `process`
/// only takes the in-memory snapshot.
pub struct SnapshotProcessor {
    aggregator: Arc<StreamingAggregator>,
    sink: ResultSink,
    every: u64,
    processed: AtomicU64,
}

impl SnapshotProcessor {
    pub fn new(aggregator: Arc<StreamingAggregator>, sink: ResultSink, every: u64) -> Self {
        Self {
            aggregator,
            sink,
            every,
            processed: AtomicU64::new(0),
        }
    }

    /// Write the current ranking.
    pub fn write_snapshot(&self) -> Result<PathBuf> {
        self.sink.write(&self.aggregator.snapshot())
    }
}

impl EventProcessor for SnapshotProcessor {
    fn process(&self, event: ActivityEvent) -> Result<()> {
        self.aggregator.process(event)?;

        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;

        if self.every > 0 && processed % self.every == 0 {
            let rows = self.aggregator.snapshot();
            let sink = self.sink.clone();

            let write = move || {
                // A failed snapshot must not stop the feed.
                if let Err(e) = sink.write(&rows) {
                    error!("write streaming snapshot failed, processed: {}, error: {}", processed, e);
                }
            };

            // The caller may be the producer, the file is written off its task.
            match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(write);
                }
                Err(_) => write(),
            }
        }

        Ok(())
    }
}
