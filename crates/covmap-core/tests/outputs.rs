use std::fs;
use std::path::PathBuf;

use polars::prelude::*;

use covmap_core::outputs::{write_csv, write_parquet, write_run_summary, RunSummary};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("covmap-outputs-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("scratch dir");
    dir.join(name)
}

fn sample_frame() -> DataFrame {
    df!(
        "fips" => &[Some("01001"), Some("25007")],
        "county" => &[Some("Autauga"), Some("Dukes")],
        "deaths" => &[Some(46i64), None],
        "deaths_to_pop" => &[0.0823f64, 0.0058f64],
    )
    .unwrap()
}

#[test]
fn csv_output_renders_nulls_as_empty_cells() {
    let path = scratch("table.csv");
    write_csv(&sample_frame(), &path).expect("csv written");

    let content = fs::read_to_string(&path).expect("csv readable");
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("fips,county,deaths,deaths_to_pop"));
    assert_eq!(lines.next(), Some("01001,Autauga,46,0.0823"));
    assert_eq!(lines.next(), Some("25007,Dukes,,0.0058"));
}

#[test]
fn parquet_output_round_trips() {
    let path = scratch("table.parquet");
    let df = sample_frame();
    write_parquet(&df, &path).expect("parquet written");

    let file = fs::File::open(&path).expect("parquet readable");
    let loaded = ParquetReader::new(file).finish().expect("parquet parses");
    assert_eq!(loaded.shape(), df.shape());
    assert_eq!(
        loaded.column("deaths").unwrap().i64().unwrap().get(1),
        None
    );
}

#[test]
fn run_summary_serializes_counts_and_dates() {
    let path = scratch("run_summary.json");
    let mut summary = RunSummary::new();
    summary.county_rows = Some(3142);
    summary.as_of_county = Some("2020-12-09".to_string());
    write_run_summary(&summary, &path).expect("summary written");

    let parsed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("summary readable"))
            .expect("summary is valid json");
    assert_eq!(parsed["county_rows"], 3142);
    assert_eq!(parsed["as_of_county"], "2020-12-09");
    assert!(parsed["generated_at"].is_string());
}
