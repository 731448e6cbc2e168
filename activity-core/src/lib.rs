//! Core of the activity inspector.
//!
//! Events are ingested from a csv file or a `platform=<value>` partitioned parquet
//! dataset, cleaned, and ranked: for every platform, the `N` users with the most
//! distinct sessions. Rankings are written by the `ResultSink`.
//!
//! The live feed path lives in `activity-streamer`, it reuses the per-event
//! `StreamingAggregator` defined here.

pub mod aggregator;
pub mod cleaning;
pub mod config;
pub mod converter;
pub mod csv_reader;
pub mod dataset;
pub mod error;
pub mod event;
pub mod generator;
pub mod partition;
pub mod plan;
pub mod sink;
pub mod tool;
