use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures a caller may want to tell apart.
///
/// Everything is still propagated as `anyhow::Error`, use `downcast_ref` to
/// recover the kind.
#[derive(Debug, Error)]
pub enum InspectorError {
    /// Input is missing or unreadable. The whole run is aborted.
    #[error("source error, path: {path}, reason: {reason}")]
    Source { path: PathBuf, reason: String },

    /// `top_n` must be a positive integer.
    #[error("invalid top_n: {0}, must be a positive integer")]
    InvalidTopN(i64),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl InspectorError {
    pub fn source_at<P: AsRef<Path>, R: ToString>(path: P, reason: R) -> Self {
        Self::Source {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
