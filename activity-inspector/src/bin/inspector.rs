use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;

use activity_core::config::{InspectorConfig, Mode};
use activity_core::converter::DatasetConverter;
use activity_core::dataset::DatasetGenerator;
use activity_core::error_bail;
use activity_core::tool::init_log;
use activity_inspector::inspector::DatasetInspector;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    /// Write a synthetic csv dataset.
    Generator,

    /// Convert a csv dataset into a partitioned parquet dataset.
    Converter,

    /// Rank the most active users per platform.
    Inspector,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, value_enum, default_value_t = Operation::Inspector)]
    op: Operation,

    /// `toml` config file, command line values take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of users kept per platform.
    #[arg(short, long, allow_hyphen_values = true)]
    n: Option<i64>,

    /// Csv file, or root of the partitioned dataset.
    #[arg(short, long)]
    filepath: Option<PathBuf>,

    /// csv, parquet or streaming.
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Partition to inspect, may be repeated. Parquet mode only.
    #[arg(short, long)]
    platform: Vec<String>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Generator: number of records.
    #[arg(long, default_value_t = 10000)]
    num_records: u64,

    /// Generator and converter: where datasets are written.
    #[arg(long, default_value = "datasets")]
    dataset_dir: PathBuf,

    /// Converter: max rows per parquet file.
    #[arg(long, default_value_t = 100000)]
    block_rows: usize,

    /// Converter: also drop `Unknown` platforms and `invalid_session` sessions.
    #[arg(long)]
    filtering_required: bool,

    /// Generator and streaming: fixed random seed.
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn inspector_config(&self) -> Result<InspectorConfig> {
        let mut config = match &self.config {
            Some(path) => InspectorConfig::from_config_file(path)?,
            None => InspectorConfig::default(),
        };

        if let Some(n) = self.n {
            config.top_n = n;
        }

        if let Some(filepath) = &self.filepath {
            config.file_path = filepath.clone();
        }

        if let Some(mode) = self.mode {
            config.mode = mode;
        }

        if !self.platform.is_empty() {
            config.platforms = Some(self.platform.clone());
        }

        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }

        if self.seed.is_some() {
            config.generator.seed = self.seed;
        }

        Ok(config)
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.inspector_config()?;

    match args.op {
        Operation::Generator => {
            config.generator.validate()?;

            let path = DatasetGenerator::new(args.num_records, config.generator.clone())?
                .generate_csv(&args.dataset_dir)?;

            info!("dataset written: {}", path.display());
        }
        Operation::Converter => {
            let (root, stats) = DatasetConverter::new(
                &config.file_path,
                &args.dataset_dir,
                args.block_rows,
                args.filtering_required,
            )
            .convert()?;

            info!("partitioned dataset written: {}, stats: {:?}", root.display(), stats);
        }
        Operation::Inspector => {
            let inspection = DatasetInspector::new(config)
                .with_catch_signals(true)
                .inspect()
                .await?;

            for row in &inspection.rows {
                info!(
                    "platform: {}, user_id: {}, unique_session_count: {}",
                    row.platform, row.user_id, row.unique_session_count
                );
            }

            info!("ranking written: {}", inspection.output.display());
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    init_log();

    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error_bail!("build tokio runtime failed, error: {}", e);
        }
    };

    runtime.block_on(run(args))
}
