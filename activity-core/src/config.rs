use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};

use crate::error::InspectorError;

/// Where the events come from.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, EnumString, Display, Deserialize, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One delimited file with a header row.
    #[default]
    Csv,

    /// A directory with `platform=<value>` partitions of parquet files.
    Parquet,

    /// Synthetic live feed.
    Streaming,
}

/// Live feed settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Capacity of the buffer between producer and consumer.
    pub capacity: usize,

    /// Interval between two produced events.
    pub produce_interval_ms: u64,

    /// Simulated processing time of one consumed event.
    pub process_latency_ms: u64,

    /// Write a ranking snapshot every `snapshot_every` processed events. `0` means only
    /// once at shutdown.
    pub snapshot_every: u64,

    /// Stop producing after this many events. Run until cancelled if absent.
    pub max_events: Option<u64>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            produce_interval_ms: 1000,
            process_latency_ms: 2000,
            snapshot_every: 0,
            max_events: None,
        }
    }
}

impl StreamingConfig {
    pub fn produce_interval(&self) -> Duration {
        Duration::from_millis(self.produce_interval_ms)
    }

    pub fn process_latency(&self) -> Duration {
        Duration::from_millis(self.process_latency_ms)
    }
}

/// Synthetic feed settings, error injection rates are probabilities in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// User ids are drawn from `1..=user_count`.
    pub user_count: u64,

    pub invalid_session_rate: f64,

    pub unknown_platform_rate: f64,

    pub missing_activity_time_rate: f64,

    pub unknown_activity_rate: f64,

    /// Fixed seed for reproducible feeds.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            user_count: 999,
            invalid_session_rate: 0.1,
            unknown_platform_rate: 0.1,
            missing_activity_time_rate: 0.1,
            unknown_activity_rate: 0.1,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.user_count == 0 {
            return Err(InspectorError::InvalidConfig("user_count must be positive".to_string()).into());
        }

        let rates = [
            ("invalid_session_rate", self.invalid_session_rate),
            ("unknown_platform_rate", self.unknown_platform_rate),
            ("missing_activity_time_rate", self.missing_activity_time_rate),
            ("unknown_activity_rate", self.unknown_activity_rate),
        ];

        for (name, rate) in rates {
            if !(0.0..=1.0).contains(&rate) {
                return Err(InspectorError::InvalidConfig(format!(
                    "{} must be in [0, 1], got {}",
                    name, rate
                ))
                .into());
            }
        }

        Ok(())
    }
}

/// Settings of one inspection run.
///
/// Can be loaded from a `toml` file, every field has a default. Must be validated
/// with `validate` before any I/O.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// Number of users kept per platform.
    pub top_n: i64,

    /// CSV file, or root directory of the partitioned dataset.
    pub file_path: PathBuf,

    pub mode: Mode,

    /// Partitions to inspect, only used in `parquet` mode. All partitions if absent.
    pub platforms: Option<Vec<String>>,

    /// Where ranking files are written.
    pub output_dir: PathBuf,

    pub streaming: StreamingConfig,

    pub generator: GeneratorConfig,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            file_path: PathBuf::from("output.csv"),
            mode: Mode::default(),
            platforms: None,
            output_dir: PathBuf::from("results"),
            streaming: StreamingConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl InspectorConfig {
    /// Parse from a `toml` file.
    pub fn from_config_file<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let content = std::fs::read_to_string(filename.as_ref()).map_err(|e| {
            InspectorError::InvalidConfig(format!(
                "cannot read config file {}: {}",
                filename.as_ref().display(),
                e
            ))
        })?;

        Self::from_config_str(&content)
    }

    /// Parse from a `toml` string.
    pub fn from_config_str(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| InspectorError::InvalidConfig(e.to_string()).into())
    }

    /// Check every value, no I/O is done here.
    pub fn validate(&self) -> Result<()> {
        if self.top_n <= 0 {
            return Err(InspectorError::InvalidTopN(self.top_n).into());
        }

        if let Some(platforms) = &self.platforms {
            if platforms.iter().any(|p| p.is_empty()) {
                return Err(
                    InspectorError::InvalidConfig("empty platform in allow-list".to_string()).into(),
                );
            }

            if self.mode != Mode::Parquet {
                warn!(
                    "platform allow-list is only used in parquet mode, ignored, mode: {}",
                    self.mode
                );
            }
        }

        if self.mode == Mode::Streaming {
            if self.streaming.capacity == 0 {
                return Err(
                    InspectorError::InvalidConfig("streaming capacity must be positive".to_string())
                        .into(),
                );
            }

            self.generator.validate()?;
        }

        info!(
            "config validated, mode: {}, top_n: {}, file_path: {}",
            self.mode,
            self.top_n,
            self.file_path.display()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_mode_from_str() {
        assert_eq!(Mode::from_str("csv").unwrap(), Mode::Csv);
        assert_eq!(Mode::from_str("parquet").unwrap(), Mode::Parquet);
        assert_eq!(Mode::from_str("streaming").unwrap(), Mode::Streaming);
        assert!(Mode::from_str("json").is_err());
        assert_eq!(Mode::Streaming.to_string(), "streaming");
    }

    #[test]
    fn test_default_config() {
        let config = InspectorConfig::default();

        assert_eq!(config.top_n, 3);
        assert_eq!(config.mode, Mode::Csv);
        assert_eq!(config.streaming.capacity, 1000);
        assert_eq!(config.streaming.produce_interval(), Duration::from_secs(1));
        assert_eq!(config.streaming.process_latency(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_top_n() {
        for top_n in [0, -1] {
            let config = InspectorConfig {
                top_n,
                ..Default::default()
            };

            let err = config.validate().unwrap_err();
            assert!(matches!(
                err.downcast_ref::<InspectorError>(),
                Some(InspectorError::InvalidTopN(n)) if *n == top_n
            ));
        }
    }

    #[test]
    fn test_from_config_str() {
        let content = r#"
            top_n = 5
            file_path = "data/parquets"
            mode = "parquet"
            platforms = ["iOS"]

            [streaming]
            capacity = 10
        "#;

        let config = InspectorConfig::from_config_str(content).unwrap();

        assert_eq!(config.top_n, 5);
        assert_eq!(config.mode, Mode::Parquet);
        assert_eq!(config.platforms, Some(vec!["iOS".to_string()]));
        assert_eq!(config.streaming.capacity, 10);
        assert_eq!(config.streaming.process_latency_ms, 2000);
        assert_eq!(config.output_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_invalid_rates() {
        let config = InspectorConfig {
            mode: Mode::Streaming,
            generator: GeneratorConfig {
                invalid_session_rate: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(config.validate().is_err());

        let config = InspectorConfig {
            mode: Mode::Streaming,
            streaming: StreamingConfig {
                capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }
}
