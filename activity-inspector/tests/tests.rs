use anyhow::Result;
use log::info;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use activity_core::config::{GeneratorConfig, InspectorConfig, Mode, StreamingConfig};
use activity_core::converter::DatasetConverter;
use activity_core::error::InspectorError;
use activity_core::event::RankingRow;
use activity_core::tool::setup_log;
use activity_inspector::inspector::DatasetInspector;

const EVENTS: &str = "user_id,session_id,platform,activity_time,activity_type\n\
    u1,s1,iOS,,login\n\
    u1,s2,iOS,,view\n\
    u1,s3,iOS,,click\n\
    u2,s4,iOS,,login\n\
    u2,s4,iOS,,logout\n\
    u1,s5,Android,,login\n\
    u4,s7,Android,,login\n\
    u4,s8,Android,,view\n\
    u3,invalid_session,Android,,login\n\
    u3,s6,Unknown,,login\n\
    u5,s9,Web,,purchase\n\
    ,s10,Web,,login\n";

fn write_events(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("events.csv");
    std::fs::write(&path, EVENTS)?;
    Ok(path)
}

fn config(mode: Mode, file_path: &Path, output_dir: &Path, top_n: i64) -> InspectorConfig {
    InspectorConfig {
        top_n,
        file_path: file_path.to_path_buf(),
        mode,
        output_dir: output_dir.to_path_buf(),
        ..Default::default()
    }
}

fn read_result(path: &Path) -> Result<Vec<RankingRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<RankingRow>, _>>()?;
    Ok(rows)
}

#[tokio::test]
async fn test_csv_mode_writes_ranking() -> Result<()> {
    setup_log();

    let dir = tempfile::tempdir()?;
    let path = write_events(dir.path())?;
    let output_dir = dir.path().join("results");

    let inspection = DatasetInspector::new(config(Mode::Csv, &path, &output_dir, 1))
        .inspect()
        .await?;

    let expected = vec![
        RankingRow::new("Android", "u4", 2),
        RankingRow::new("Web", "u5", 1),
        RankingRow::new("iOS", "u1", 3),
    ];

    assert_eq!(inspection.rows, expected);
    assert!(inspection.output.starts_with(&output_dir));

    let name = inspection
        .output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    assert!(name.starts_with("Result_") && name.ends_with(".csv"));

    assert_eq!(read_result(&inspection.output)?, expected);

    Ok(())
}

#[tokio::test]
async fn test_parquet_mode_allow_list() -> Result<()> {
    setup_log();

    let dir = tempfile::tempdir()?;
    let path = write_events(dir.path())?;
    let root = dir.path().join("events.parquet");
    DatasetConverter::new(&path, dir.path(), 2, true).convert_into(&root)?;

    let output_dir = dir.path().join("results");

    let all = DatasetInspector::new(config(Mode::Parquet, &root, &output_dir, 3))
        .inspect()
        .await?;

    let platforms = all
        .rows
        .iter()
        .map(|r| r.platform.as_str())
        .collect::<HashSet<_>>();
    assert_eq!(platforms, HashSet::from(["Android", "Web", "iOS"]));

    let only_ios = DatasetInspector::new(InspectorConfig {
        platforms: Some(vec!["iOS".to_string()]),
        ..config(Mode::Parquet, &root, &output_dir, 3)
    })
    .inspect()
    .await?;

    info!("iOS rows: {:?}", only_ios.rows);

    assert_eq!(
        only_ios.rows,
        vec![RankingRow::new("iOS", "u1", 3), RankingRow::new("iOS", "u2", 1)]
    );

    // Case sensitive match.
    let none = DatasetInspector::new(InspectorConfig {
        platforms: Some(vec!["ios".to_string()]),
        ..config(Mode::Parquet, &root, &output_dir, 3)
    })
    .inspect()
    .await?;
    assert!(none.rows.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_parquet_matches_csv() -> Result<()> {
    setup_log();

    let dir = tempfile::tempdir()?;
    let path = write_events(dir.path())?;
    let root = dir.path().join("events.parquet");
    DatasetConverter::new(&path, dir.path(), 100, true).convert_into(&root)?;

    let output_dir = dir.path().join("results");

    let from_csv = DatasetInspector::new(config(Mode::Csv, &path, &output_dir, 2))
        .inspect()
        .await?;
    let from_parquet = DatasetInspector::new(config(Mode::Parquet, &root, &output_dir, 2))
        .inspect()
        .await?;

    assert_eq!(from_csv.rows, from_parquet.rows);

    Ok(())
}

#[tokio::test]
async fn test_invalid_top_n_rejected_before_io() -> Result<()> {
    setup_log();

    let dir = tempfile::tempdir()?;
    let output_dir = dir.path().join("results");

    // The input does not exist, validation must fail first.
    let missing = dir.path().join("missing.csv");

    for top_n in [0, -3] {
        let err = DatasetInspector::new(config(Mode::Csv, &missing, &output_dir, top_n))
            .inspect()
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InspectorError>(),
            Some(InspectorError::InvalidTopN(n)) if *n == top_n
        ));
    }

    assert!(!output_dir.exists());

    Ok(())
}

#[tokio::test]
async fn test_missing_source_writes_nothing() -> Result<()> {
    setup_log();

    let dir = tempfile::tempdir()?;
    let output_dir = dir.path().join("results");

    for mode in [Mode::Csv, Mode::Parquet] {
        let missing = dir.path().join("missing");

        let err = DatasetInspector::new(config(mode, &missing, &output_dir, 3))
            .inspect()
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InspectorError>(),
            Some(InspectorError::Source { .. })
        ));
    }

    assert!(!output_dir.exists());

    Ok(())
}

#[tokio::test]
async fn test_empty_input_writes_header_only() -> Result<()> {
    setup_log();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "user_id,session_id,platform,activity_time,activity_type\n")?;

    let output_dir = dir.path().join("results");

    let inspection = DatasetInspector::new(config(Mode::Csv, &path, &output_dir, 3))
        .inspect()
        .await?;

    assert!(inspection.rows.is_empty());
    assert!(read_result(&inspection.output)?.is_empty());

    // Partitioned root without any partition.
    let root = dir.path().join("empty.parquet");
    std::fs::create_dir_all(root.join("not_a_partition"))?;

    let inspection = DatasetInspector::new(config(Mode::Parquet, &root, &output_dir, 3))
        .inspect()
        .await?;

    assert!(inspection.rows.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_streaming_mode() -> Result<()> {
    setup_log();

    let dir = tempfile::tempdir()?;
    let output_dir = dir.path().join("results");

    let config = InspectorConfig {
        top_n: 2,
        mode: Mode::Streaming,
        output_dir: output_dir.clone(),
        streaming: StreamingConfig {
            capacity: 2,
            produce_interval_ms: 2,
            process_latency_ms: 10,
            snapshot_every: 0,
            max_events: Some(30),
        },
        generator: GeneratorConfig {
            user_count: 4,
            seed: Some(21),
            ..Default::default()
        },
        ..Default::default()
    };

    let inspection = DatasetInspector::new(config).inspect().await?;

    assert!(!inspection.rows.is_empty());
    assert!(inspection.rows.iter().all(|r| r.unique_session_count > 0));

    for platform in ["Android", "Web", "iOS"] {
        assert!(inspection.rows.iter().filter(|r| r.platform == platform).count() <= 2);
    }

    assert_eq!(read_result(&inspection.output)?, inspection.rows);

    Ok(())
}
