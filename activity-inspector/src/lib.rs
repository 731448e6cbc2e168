//! Entry point of the activity inspector.
//!
//! `DatasetInspector` validates the configuration, ranks the events of the
//! configured source and writes the result. The `activity-inspector` binary
//! also wraps the dataset generator and the csv to parquet converter.

pub mod inspector;
