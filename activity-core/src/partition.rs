//! Partitioned datasets.
//!
//! A partitioned dataset is a directory whose immediate children are named
//! `platform=<value>`. Each child holds one or more parquet files, at any depth,
//! sharing the schema of the activity dataset. The value in the directory name is
//! authoritative for every row below it, any in-row `platform` column is ignored.
//!
//! Children that do not match the naming pattern are skipped silently.

use anyhow::Result;
use arrow_array::cast::AsArray;
use arrow_array::{Array, RecordBatch};
use arrow_schema::DataType;
use log::{debug, info};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::InspectorError;
use crate::event::{ActivityEvent, SESSION_ID, USER_ID};

/// Prefix of a partition directory name.
pub const PARTITION_PREFIX: &str = "platform=";

/// Extension of the columnar files inside a partition.
pub const PARQUET_EXTENSION: &str = "parquet";

const BATCH_SIZE: usize = 8192;

/// Extract the platform from a partition directory name.
///
/// Returns `None` if the name does not match `platform=<value>` with a non empty value.
pub fn partition_value(name: &str) -> Option<&str> {
    name.strip_prefix(PARTITION_PREFIX).filter(|v| !v.is_empty())
}

/// One `platform=<value>` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Value extracted from the directory name.
    pub platform: String,

    /// Path of the partition directory.
    pub path: PathBuf,

    /// All parquet files below `path`, sorted.
    pub files: Vec<PathBuf>,
}

impl Partition {
    /// Lazily read every row of the partition, tagged with the partition platform.
    pub fn events(&self) -> ParquetEventReader {
        ParquetEventReader::new(&self.platform, self.files.clone())
    }
}

/// Root of a partitioned dataset.
pub struct PartitionedDataset {
    root: PathBuf,
}

impl PartitionedDataset {
    /// Fails with `InspectorError::Source` if `root` is not a readable directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(InspectorError::source_at(&root, "dataset directory not found").into());
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List the partitions, sorted by platform.
    ///
    /// If `allow_list` is given, partitions whose value is not in it are skipped. The
    /// match is exact and case sensitive.
    pub fn partitions(&self, allow_list: Option<&[String]>) -> Result<Vec<Partition>> {
        let allowed: Option<HashSet<&str>> =
            allow_list.map(|list| list.iter().map(|s| s.as_str()).collect());

        let entries =
            std::fs::read_dir(&self.root).map_err(|e| InspectorError::source_at(&self.root, e))?;

        let mut partitions = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| InspectorError::source_at(&self.root, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            let platform = match partition_value(&name) {
                Some(platform) => platform.to_string(),
                None => {
                    debug!("skip entry, not a partition: {}", name);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                debug!("skip entry, not a directory: {}", name);
                continue;
            }

            if let Some(allowed) = &allowed {
                if !allowed.contains(platform.as_str()) {
                    info!("skip partition, not in allow-list: {}", platform);
                    continue;
                }
            }

            let files = walk_parquet_files(&path)?;

            info!(
                "found partition, platform: {}, files: {}",
                platform,
                files.len()
            );

            partitions.push(Partition {
                platform,
                path,
                files,
            });
        }

        partitions.sort_by(|a, b| a.platform.cmp(&b.platform));

        Ok(partitions)
    }
}

/// Collect every `.parquet` file below `root`, sorted.
fn walk_parquet_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).map_err(|e| InspectorError::source_at(&dir, e))? {
            let entry = entry.map_err(|e| InspectorError::source_at(&dir, e))?;
            let path = entry.path();

            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == PARQUET_EXTENSION) {
                out.push(path);
            }
        }
    }

    out.sort();

    Ok(out)
}

/// Lazy reader of the rows of one partition.
///
/// Files are opened one after another, only `user_id` and `session_id` are
/// decoded. Columns of any type are read as strings.
pub struct ParquetEventReader {
    platform: String,
    files: Vec<PathBuf>,

    /// Index of the next file to open.
    pos: usize,

    reader: Option<ParquetRecordBatchReader>,

    /// Decoded rows of the current batch.
    pending: VecDeque<ActivityEvent>,

    done: bool,
}

impl ParquetEventReader {
    pub fn new(platform: &str, files: Vec<PathBuf>) -> Self {
        Self {
            platform: platform.to_string(),
            files,
            pos: 0,
            reader: None,
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn open_next_file(&mut self) -> Result<bool> {
        if self.pos >= self.files.len() {
            return Ok(false);
        }

        let path = self.files[self.pos].clone();
        self.pos += 1;

        let file = File::open(&path).map_err(|e| InspectorError::source_at(&path, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| InspectorError::source_at(&path, e))?;

        let mut roots = Vec::with_capacity(2);
        for name in [USER_ID, SESSION_ID] {
            let index = builder
                .schema()
                .index_of(name)
                .map_err(|_| InspectorError::source_at(&path, format!("missing column: {}", name)))?;
            roots.push(index);
        }

        let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
        let reader = builder
            .with_projection(mask)
            .with_batch_size(BATCH_SIZE)
            .build()
            .map_err(|e| InspectorError::source_at(&path, e))?;

        debug!("open parquet file: {}", path.display());

        self.reader = Some(reader);

        Ok(true)
    }

    fn decode_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let user_ids = string_column(batch, USER_ID)?;
        let session_ids = string_column(batch, SESSION_ID)?;

        let user_ids = user_ids
            .as_string_opt::<i32>()
            .ok_or_else(|| anyhow::anyhow!("user_id is not a string column"))?;
        let session_ids = session_ids
            .as_string_opt::<i32>()
            .ok_or_else(|| anyhow::anyhow!("session_id is not a string column"))?;

        for (user_id, session_id) in user_ids.iter().zip(session_ids.iter()) {
            self.pending.push_back(ActivityEvent {
                user_id: user_id.map(|s| s.to_string()),
                session_id: session_id.map(|s| s.to_string()),
                platform: Some(self.platform.clone()),
                activity_time: None,
                activity_type: None,
            });
        }

        Ok(())
    }

    fn fill(&mut self) -> Result<bool> {
        loop {
            match self.reader.as_mut() {
                Some(reader) => match reader.next() {
                    Some(batch) => {
                        let batch = batch.map_err(|e| {
                            InspectorError::source_at(&self.files[self.pos - 1], e)
                        })?;
                        self.decode_batch(&batch)?;

                        if !self.pending.is_empty() {
                            return Ok(true);
                        }
                    }
                    None => self.reader = None,
                },
                None => {
                    if !self.open_next_file()? {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

/// Get a column of the batch as utf8, casting if needed.
fn string_column(batch: &RecordBatch, name: &str) -> Result<std::sync::Arc<dyn Array>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| anyhow::anyhow!("missing column in batch: {}", name))?;

    if column.data_type() == &DataType::Utf8 {
        return Ok(column.clone());
    }

    Ok(arrow_cast::cast(column.as_ref(), &DataType::Utf8)?)
}

impl Iterator for ParquetEventReader {
    type Item = Result<ActivityEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.pending.pop_front() {
            return Some(Ok(event));
        }

        if self.done {
            return None;
        }

        match self.fill() {
            Ok(true) => self.pending.pop_front().map(Ok),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
