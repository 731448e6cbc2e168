use anyhow::{anyhow, Result};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};

use activity_core::aggregator::{StreamingAggregator, TopN};
use activity_core::cleaning::CleaningFilter;
use activity_core::config::{InspectorConfig, Mode};
use activity_core::csv_reader::CsvEventReader;
use activity_core::event::RankingRow;
use activity_core::generator::SyntheticFeed;
use activity_core::partition::PartitionedDataset;
use activity_core::plan::EventPlan;
use activity_core::sink::ResultSink;
use activity_streamer::coordinator::StreamCoordinator;
use activity_streamer::snapshot::SnapshotProcessor;

/// Result of one inspection run.
#[derive(Debug, Clone)]
pub struct Inspection {
    /// Ranking, platform blocks in ascending platform order.
    pub rows: Vec<RankingRow>,

    /// File the ranking was written to.
    pub output: PathBuf,
}

/// Runs one inspection in the configured mode and writes the ranking.
///
/// Nothing is written when the source cannot be read.
pub struct DatasetInspector {
    config: InspectorConfig,

    /// Stop the live feed on SIGINT/SIGTERM.
    catch_signals: bool,
}

impl DatasetInspector {
    pub fn new(config: InspectorConfig) -> Self {
        Self {
            config,
            catch_signals: false,
        }
    }

    pub fn with_catch_signals(mut self, catch_signals: bool) -> Self {
        self.catch_signals = catch_signals;
        self
    }

    pub async fn inspect(&self) -> Result<Inspection> {
        self.config.validate()?;

        let top_n = TopN::new(self.config.top_n)?;
        let sink = ResultSink::new(&self.config.output_dir);

        let rows = match self.config.mode {
            Mode::Csv => self.rank_csv(top_n).await?,
            Mode::Parquet => self.rank_partitions(top_n).await?,
            Mode::Streaming => return self.run_streaming(top_n, sink).await,
        };

        let output = sink.write(&rows)?;

        info!(
            "inspection done, mode: {}, rows: {}, output: {}",
            self.config.mode,
            rows.len(),
            output.display()
        );

        Ok(Inspection { rows, output })
    }

    /// Global shape: clean, group by `(platform, user_id)`, rank.
    async fn rank_csv(&self, top_n: TopN) -> Result<Vec<RankingRow>> {
        let path = self.config.file_path.clone();

        tokio::task::spawn_blocking(move || {
            info!("inspect csv file: {}", path.display());

            EventPlan::scan(CsvEventReader::new(&path)?)
                .clean(CleaningFilter::new())
                .project()
                .group_by_platform_user()
                .top_n(top_n)
                .collect()
        })
        .await?
    }

    /// Per partition shape: rank every partition on its own blocking task and
    /// concatenate in platform order.
    async fn rank_partitions(&self, top_n: TopN) -> Result<Vec<RankingRow>> {
        let dataset = PartitionedDataset::open(&self.config.file_path)?;
        let partitions = dataset.partitions(self.config.platforms.as_deref())?;

        let num_threads = num_cpus::get().max(1);
        let semaphore = Arc::new(Semaphore::new(num_threads));

        info!(
            "inspect partitioned dataset: {}, partitions: {}, num_threads: {}",
            dataset.root().display(),
            partitions.len(),
            num_threads
        );

        let mut handles = Vec::with_capacity(partitions.len());

        for partition in partitions {
            let permit = semaphore.clone().acquire_owned().await?;

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;

                let rows = EventPlan::scan(partition.events())
                    .project()
                    .group_by_user(&partition.platform)
                    .top_n(top_n)
                    .collect()?;

                info!(
                    "partition ranked, platform: {}, files: {}, rows: {}",
                    partition.platform,
                    partition.files.len(),
                    rows.len()
                );

                Ok::<_, anyhow::Error>(rows)
            }));
        }

        let mut rows = Vec::new();
        for handle in handles {
            rows.extend(handle.await??);
        }

        Ok(rows)
    }

    /// Feed synthetic events through the coordinator until `max_events` or a
    /// shutdown request, then write the final ranking.
    async fn run_streaming(&self, top_n: TopN, sink: ResultSink) -> Result<Inspection> {
        let streaming = self.config.streaming.clone();

        let aggregator = Arc::new(StreamingAggregator::new(top_n));
        let feed = SyntheticFeed::new(self.config.generator.clone())?;
        let processor = Arc::new(SnapshotProcessor::new(
            aggregator.clone(),
            sink,
            streaming.snapshot_every,
        ));

        let coordinator = StreamCoordinator::new(streaming, feed, processor.clone());
        let stats = coordinator.stats();

        let toplevel = Toplevel::new(|s| async move {
            s.start(SubsystemBuilder::new("stream", |a| coordinator.run(a)));
        });

        let toplevel = if self.catch_signals {
            toplevel.catch_signals()
        } else {
            toplevel
        };

        toplevel
            .handle_shutdown_requests(Duration::from_millis(1000))
            .await
            .map_err(|e| anyhow!("streaming stopped with errors: {:?}", e))?;

        let rows = aggregator.snapshot();
        let output = processor.write_snapshot()?;

        info!(
            "streaming done, produced: {}, processed: {}, dropped: {}, rows: {}, output: {}",
            stats.produced(),
            aggregator.invocations(),
            aggregator.dropped(),
            rows.len(),
            output.display()
        );

        Ok(Inspection { rows, output })
    }
}
