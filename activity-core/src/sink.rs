use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::info;
use std::path::{Path, PathBuf};

use crate::event::{RankingRow, PLATFORM, USER_ID};
use crate::tool::timestamp_string;

pub const UNIQUE_SESSION_COUNT: &str = "unique_session_count";

/// Writes rankings to `<output_dir>/Result_<dd_mm_YYYY_HH_MM_SS>.csv`.
///
/// The name has second resolution. A second write within the same second
/// replaces the first file, rows are not merged.
#[derive(Debug, Clone)]
pub struct ResultSink {
    output_dir: PathBuf,
}

impl ResultSink {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// File name used for a write at `now`.
    pub fn result_path(&self, now: &DateTime<Local>) -> PathBuf {
        self.output_dir
            .join(format!("Result_{}.csv", timestamp_string(now)))
    }

    /// Write `rows` using the current local time.
    pub fn write(&self, rows: &[RankingRow]) -> Result<PathBuf> {
        self.write_at(rows, &Local::now())
    }

    /// Write `rows` as if at `now`. An empty ranking produces a header only file.
    pub fn write_at(&self, rows: &[RankingRow], now: &DateTime<Local>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("create output dir failed: {}", self.output_dir.display())
        })?;

        let path = self.result_path(now);

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("create result file failed: {}", path.display()))?;

        writer.write_record([PLATFORM, USER_ID, UNIQUE_SESSION_COUNT])?;

        for row in rows {
            writer.write_record([
                row.platform.as_str(),
                row.user_id.as_str(),
                row.unique_session_count.to_string().as_str(),
            ])?;
        }

        writer.flush()?;

        info!("write ranking, rows: {}, path: {}", rows.len(), path.display());

        Ok(path)
    }
}
