use anyhow::Result;
use async_channel::{Receiver, Sender, TrySendError};
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_graceful_shutdown::{ErrorAction, SubsystemBuilder, SubsystemHandle};

use activity_core::aggregator::EventProcessor;
use activity_core::config::StreamingConfig;
use activity_core::event::ActivityEvent;
use activity_core::generator::EventSource;

/// Counters of one streaming run.
#[derive(Default, Debug)]
pub struct StreamStats {
    /// Events obtained from the source.
    pub produced: AtomicU64,

    /// Events put into the buffer.
    pub enqueued: AtomicU64,

    /// Events processed by the producer because the buffer was full.
    pub direct_dispatched: AtomicU64,

    /// Events taken from the buffer and processed by the consumer.
    pub consumed: AtomicU64,
}

impl StreamStats {
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn direct_dispatched(&self) -> u64 {
        self.direct_dispatched.load(Ordering::Relaxed)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }
}

/// Producer/consumer pair over a bounded buffer.
///
/// The producer takes one event from the source every `produce_interval` and tries
/// to put it into the buffer. It never waits for space: when the buffer is full the
/// event is handed to the processor right away, on the producer task (direct
/// dispatch). The consumer waits for an event, sleeps `process_latency` to
/// simulate work, then hands the event to the processor.
///
/// Both loops check for shutdown on every iteration. A failing loop stops alone,
/// the other one keeps running.
///
/// With `max_events` the producer stops after that many events, the consumer drains
/// the buffer and stops too.
pub struct StreamCoordinator<S: EventSource, P: EventProcessor> {
    config: StreamingConfig,
    source: S,
    processor: Arc<P>,
    stats: Arc<StreamStats>,
}

impl<S: EventSource, P: EventProcessor> StreamCoordinator<S, P> {
    pub fn new(config: StreamingConfig, source: S, processor: Arc<P>) -> Self {
        Self {
            config,
            source,
            processor,
            stats: Arc::new(StreamStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        self.stats.clone()
    }

    /// Start the producer and consumer as child subsystems and wait for both.
    pub async fn run(self, subsys: SubsystemHandle) -> Result<()> {
        let capacity = self.config.capacity.max(1);
        let (sender, receiver) = async_channel::bounded::<ActivityEvent>(capacity);

        info!(
            "stream coordinator started, capacity: {}, produce_interval_ms: {}, process_latency_ms: {}",
            capacity, self.config.produce_interval_ms, self.config.process_latency_ms
        );

        let producer = Producer {
            source: self.source,
            sender,
            processor: self.processor.clone(),
            interval: self.config.produce_interval(),
            max_events: self.config.max_events,
            stats: self.stats.clone(),
        };

        let consumer = Consumer {
            receiver,
            processor: self.processor.clone(),
            latency: self.config.process_latency(),
            stats: self.stats.clone(),
        };

        subsys.start(
            SubsystemBuilder::new("producer", |s| producer.run(s))
                .on_failure(ErrorAction::CatchAndLocalShutdown),
        );
        subsys.start(
            SubsystemBuilder::new("consumer", |s| consumer.run(s))
                .on_failure(ErrorAction::CatchAndLocalShutdown),
        );

        subsys.wait_for_children().await;

        info!(
            "stream coordinator done, produced: {}, enqueued: {}, direct_dispatched: {}, consumed: {}",
            self.stats.produced(),
            self.stats.enqueued(),
            self.stats.direct_dispatched(),
            self.stats.consumed()
        );

        Ok(())
    }
}

struct Producer<S: EventSource, P: EventProcessor> {
    source: S,
    sender: Sender<ActivityEvent>,
    processor: Arc<P>,
    interval: Duration,
    max_events: Option<u64>,
    stats: Arc<StreamStats>,
}

impl<S: EventSource, P: EventProcessor> Producer<S, P> {
    async fn run(mut self, subsys: SubsystemHandle) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut warned_closed = false;

        loop {
            if self
                .max_events
                .is_some_and(|max| self.stats.produced() >= max)
            {
                info!("producer reached max events: {}", self.stats.produced());
                break;
            }

            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    info!("producer shutdown!");
                    break;
                }
                _ = ticker.tick() => {
                    let event = self.source.next_event();
                    self.stats.produced.fetch_add(1, Ordering::Relaxed);

                    match self.sender.try_send(event) {
                        Ok(()) => {
                            self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Full(event)) => {
                            self.stats.direct_dispatched.fetch_add(1, Ordering::Relaxed);
                            self.processor.process(event)?;
                        }
                        Err(TrySendError::Closed(event)) => {
                            if !warned_closed {
                                warn!("buffer closed, consumer is gone, dispatch every event directly");
                                warned_closed = true;
                            }

                            self.stats.direct_dispatched.fetch_add(1, Ordering::Relaxed);
                            self.processor.process(event)?;
                        }
                    }
                }
            }
        }

        // Dropping the only sender lets the consumer drain the buffer and stop.
        drop(self.sender);

        Ok(())
    }
}

struct Consumer<P: EventProcessor> {
    receiver: Receiver<ActivityEvent>,
    processor: Arc<P>,
    latency: Duration,
    stats: Arc<StreamStats>,
}

impl<P: EventProcessor> Consumer<P> {
    async fn run(self, subsys: SubsystemHandle) -> Result<()> {
        loop {
            let event = tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    info!("consumer shutdown!");
                    break;
                }
                event = self.receiver.recv() => match event {
                    Ok(event) => event,
                    Err(_) => {
                        info!("buffer closed and drained, consumer done");
                        break;
                    }
                }
            };

            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    info!("consumer shutdown, in flight event dropped");
                    break;
                }
                _ = tokio::time::sleep(self.latency) => {}
            }

            self.processor.process(event)?;
            self.stats.consumed.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}
