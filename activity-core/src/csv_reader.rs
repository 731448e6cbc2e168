use anyhow::Result;
use csv::StringRecord;
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::InspectorError;
use crate::event::{ActivityEvent, PLATFORM, SESSION_ID, USER_ID};

/// Lazy reader of a delimited activity file.
///
/// Only `user_id`, `session_id` and `platform` are materialized, the other
/// columns are projected away while reading. Empty fields and fields missing at
/// the end of a short row are absent.
pub struct CsvEventReader {
    path: PathBuf,
    reader: csv::Reader<File>,
    record: StringRecord,

    /// Positions of `user_id`, `session_id`, `platform` in the header.
    user_id_index: usize,
    session_id_index: usize,
    platform_index: usize,

    /// Number of rows read so far.
    rows: u64,

    done: bool,
}

impl CsvEventReader {
    /// Open the file and resolve the column positions from the header.
    ///
    /// Fails with `InspectorError::Source` if the file is missing, unreadable, or
    /// a required column is absent from the header.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.is_file() {
            return Err(InspectorError::source_at(&path, "file not found").into());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| InspectorError::source_at(&path, e))?;

        let headers = reader
            .headers()
            .map_err(|e| InspectorError::source_at(&path, e))?
            .clone();

        let find = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| InspectorError::source_at(&path, format!("missing column: {}", name)).into())
        };

        let user_id_index = find(USER_ID)?;
        let session_id_index = find(SESSION_ID)?;
        let platform_index = find(PLATFORM)?;

        info!("open csv source, path: {}", path.display());

        Ok(Self {
            path: path.clone(),
            reader,
            record: StringRecord::new(),
            user_id_index,
            session_id_index,
            platform_index,
            rows: 0,
            done: false,
        })
    }

    fn field(&self, index: usize) -> Option<String> {
        self.record
            .get(index)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    }
}

impl Iterator for CsvEventReader {
    type Item = Result<ActivityEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                self.rows += 1;

                Some(Ok(ActivityEvent {
                    user_id: self.field(self.user_id_index),
                    session_id: self.field(self.session_id_index),
                    platform: self.field(self.platform_index),
                    activity_time: None,
                    activity_type: None,
                }))
            }
            Ok(false) => {
                self.done = true;
                info!(
                    "csv source done, path: {}, rows: {}",
                    self.path.display(),
                    self.rows
                );
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(InspectorError::source_at(
                    &self.path,
                    format!("read failed at row {}: {}", self.rows + 1, e),
                )
                .into()))
            }
        }
    }
}
