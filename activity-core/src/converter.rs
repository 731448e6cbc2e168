//! Convert a csv activity dataset into a partitioned parquet dataset.
//!
//! Output layout:
//!
//! ```text
//! <output_dir>/<csv file name>_<timestamp>.parquet/
//!     platform=Android/part-0.parquet
//!     platform=Web/part-0.parquet
//!     platform=iOS/part-0.parquet
//!     platform=iOS/part-1.parquet
//! ```
//!
//! The platform is only stored in the directory name.

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use chrono::Local;
use log::info;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cleaning::CleaningFilter;
use crate::error::InspectorError;
use crate::event::{ActivityEvent, ACTIVITY_TIME, ACTIVITY_TYPE, PLATFORM, SESSION_ID, USER_ID};
use crate::partition::PARTITION_PREFIX;
use crate::tool::timestamp_string;

/// Schema of the files inside a partition.
pub fn partition_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(USER_ID, DataType::Utf8, false),
        Field::new(SESSION_ID, DataType::Utf8, false),
        Field::new(ACTIVITY_TIME, DataType::Utf8, true),
        Field::new(ACTIVITY_TYPE, DataType::Utf8, true),
    ]))
}

/// Write `events` as one parquet file. Every event must have `user_id` and `session_id`.
pub fn write_partition_file(path: &Path, events: &[ActivityEvent]) -> Result<()> {
    let schema = partition_schema();

    let column = |f: fn(&ActivityEvent) -> Option<&str>| -> ArrayRef {
        Arc::new(StringArray::from(events.iter().map(f).collect::<Vec<_>>()))
    };

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            column(|e| e.user_id.as_deref()),
            column(|e| e.session_id.as_deref()),
            column(|e| e.activity_time.as_deref()),
            column(|e| e.activity_type.as_deref()),
        ],
    )?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .with_context(|| format!("open parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("write record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("close parquet writer {}", path.display()))?;

    Ok(())
}

/// Counters of one conversion.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertStats {
    pub rows: u64,
    pub written: u64,
    pub dropped: u64,
    pub files: u64,
}

/// Csv to partitioned parquet converter.
pub struct DatasetConverter {
    csv_path: PathBuf,
    output_dir: PathBuf,

    /// Max number of rows per parquet file.
    block_rows: usize,

    /// Also drop `Unknown` platforms and `invalid_session` sessions.
    filtering_required: bool,
}

impl DatasetConverter {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        csv_path: P,
        output_dir: Q,
        block_rows: usize,
        filtering_required: bool,
    ) -> Self {
        Self {
            csv_path: csv_path.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            block_rows: block_rows.max(1),
            filtering_required,
        }
    }

    /// Convert into a new timestamped dataset directory and return its path.
    pub fn convert(&self) -> Result<(PathBuf, ConvertStats)> {
        let name = self
            .csv_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset".to_string());

        let root = self.output_dir.join(format!(
            "{}_{}.parquet",
            name,
            timestamp_string(&Local::now())
        ));

        let stats = self.convert_into(&root)?;

        Ok((root, stats))
    }

    /// Convert into `root`, creating it if needed.
    pub fn convert_into(&self, root: &Path) -> Result<ConvertStats> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.csv_path)
            .map_err(|e| InspectorError::source_at(&self.csv_path, e))?;

        let headers = reader
            .headers()
            .map_err(|e| InspectorError::source_at(&self.csv_path, e))?
            .clone();
        let index = |name: &str| headers.iter().position(|h| h.trim() == name);

        let user_id_index = index(USER_ID);
        let session_id_index = index(SESSION_ID);
        let platform_index = index(PLATFORM);
        let activity_time_index = index(ACTIVITY_TIME);
        let activity_type_index = index(ACTIVITY_TYPE);

        let filter = CleaningFilter::new();
        let mut stats = ConvertStats::default();
        let mut buffers: BTreeMap<String, Vec<ActivityEvent>> = BTreeMap::new();
        let mut parts: BTreeMap<String, usize> = BTreeMap::new();

        for record in reader.records() {
            let record = record.map_err(|e| InspectorError::source_at(&self.csv_path, e))?;
            stats.rows += 1;

            let field = |i: Option<usize>| {
                i.and_then(|i| record.get(i))
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
            };

            let event = ActivityEvent {
                user_id: field(user_id_index),
                session_id: field(session_id_index),
                platform: field(platform_index),
                activity_time: field(activity_time_index),
                activity_type: field(activity_type_index),
            };

            let keep = if self.filtering_required {
                filter.is_valid(&event)
            } else {
                event.user_id.is_some() && event.session_id.is_some() && event.platform.is_some()
            };

            let platform = match (keep, event.platform.clone()) {
                (true, Some(platform)) => platform,
                _ => {
                    stats.dropped += 1;
                    continue;
                }
            };

            let buffer = buffers.entry(platform.clone()).or_default();
            buffer.push(event);

            if buffer.len() >= self.block_rows {
                let events = std::mem::take(buffer);
                self.flush(root, &platform, &events, &mut parts, &mut stats)?;
            }
        }

        for (platform, events) in buffers {
            if !events.is_empty() {
                self.flush(root, &platform, &events, &mut parts, &mut stats)?;
            }
        }

        info!(
            "convert dataset done, csv: {}, root: {}, stats: {:?}",
            self.csv_path.display(),
            root.display(),
            stats
        );

        Ok(stats)
    }

    fn flush(
        &self,
        root: &Path,
        platform: &str,
        events: &[ActivityEvent],
        parts: &mut BTreeMap<String, usize>,
        stats: &mut ConvertStats,
    ) -> Result<()> {
        let dir = root.join(format!("{}{}", PARTITION_PREFIX, platform));
        std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

        let part = parts.entry(platform.to_string()).or_insert(0);
        let path = dir.join(format!("part-{}.parquet", part));
        *part += 1;

        write_partition_file(&path, events)?;

        stats.written += events.len() as u64;
        stats.files += 1;

        Ok(())
    }
}
