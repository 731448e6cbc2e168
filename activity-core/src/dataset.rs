use anyhow::{Context, Result};
use chrono::Local;
use log::info;
use std::path::{Path, PathBuf};

use crate::config::GeneratorConfig;
use crate::event::EVENT_COLUMNS;
use crate::generator::{EventSource, SyntheticFeed};
use crate::tool::timestamp_string;

/// Writes synthetic activity datasets as csv files.
pub struct DatasetGenerator {
    num_records: u64,
    feed: SyntheticFeed,
}

impl DatasetGenerator {
    pub fn new(num_records: u64, config: GeneratorConfig) -> Result<Self> {
        Ok(Self {
            num_records,
            feed: SyntheticFeed::new(config)?,
        })
    }

    /// Write `Dataset_<timestamp>.csv` under `output_dir` and return its path.
    pub fn generate_csv<P: AsRef<Path>>(&mut self, output_dir: P) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("create dataset dir failed: {}", output_dir.display()))?;

        let path = output_dir.join(format!("Dataset_{}.csv", timestamp_string(&Local::now())));
        self.write_csv(&path)?;

        Ok(path)
    }

    /// Write all records to `path`, absent fields are empty.
    pub fn write_csv(&mut self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create dataset file failed: {}", path.display()))?;

        writer.write_record(EVENT_COLUMNS)?;

        for _ in 0..self.num_records {
            let event = self.feed.next_event();

            writer.write_record([
                event.user_id.as_deref().unwrap_or_default(),
                event.session_id.as_deref().unwrap_or_default(),
                event.platform.as_deref().unwrap_or_default(),
                event.activity_time.as_deref().unwrap_or_default(),
                event.activity_type.as_deref().unwrap_or_default(),
            ])?;
        }

        writer.flush()?;

        info!(
            "generate dataset done, records: {}, path: {}",
            self.num_records,
            path.display()
        );

        Ok(())
    }
}
