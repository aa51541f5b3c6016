use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use covmap_parser::PrepSummary;

use crate::stats::date_from_days;

/// Everything one pipeline run produced, serialized next to the artifacts so
/// a run can be audited later.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub county_rows: Option<usize>,
    pub state_rows: Option<usize>,
    pub nyt_rows: Option<usize>,
    pub as_of_county: Option<String>,
    pub as_of_state: Option<String>,
    pub as_of_nyt: Option<String>,
    pub prep: Vec<PrepSummary>,
    pub maps: Vec<String>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            ..Self::default()
        }
    }
}

pub fn write_parquet(df: &DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create parquet file {}", path.display()))?;
    let mut clone = df.clone();
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .with_statistics(StatisticsOptions::default())
        .finish(&mut clone)
        .with_context(|| format!("failed to write parquet to {}", path.display()))?;
    info!(path = %path.display(), rows = df.height(), "parquet written");
    Ok(())
}

pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create csv file {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);

    let columns = df.get_columns();
    let header: Vec<String> = columns
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    writer.write_record(&header)?;

    for row in 0..df.height() {
        let mut record = Vec::with_capacity(columns.len());
        for column in columns {
            let value = column
                .as_materialized_series()
                .get(row)
                .map_err(|err| anyhow::anyhow!("row {row} read failed: {err}"))?;
            record.push(cell_to_string(value));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = df.height(), "csv written");
    Ok(())
}

pub fn write_run_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(summary).context("failed to serialize run summary")?;
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write run summary {}", path.display()))?;
    info!(path = %path.display(), "run summary written");
    Ok(())
}

fn cell_to_string(value: AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(text) => text.to_string(),
        AnyValue::StringOwned(text) => text.to_string(),
        AnyValue::Boolean(flag) => flag.to_string(),
        AnyValue::Int32(number) => number.to_string(),
        AnyValue::Int64(number) => number.to_string(),
        AnyValue::UInt32(number) => number.to_string(),
        AnyValue::UInt64(number) => number.to_string(),
        AnyValue::Float64(number) => format!("{number}"),
        AnyValue::Float32(number) => format!("{number}"),
        AnyValue::Date(days) => date_from_days(days).to_string(),
        other => other.to_string(),
    }
}
