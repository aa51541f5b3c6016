use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use csv::ReaderBuilder;
use polars::prelude::*;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// 2-digit state FIPS to state name, used to scope region-name matches to the
/// rollup's own state.
const STATE_NAMES: &[(&str, &str)] = &[
    ("01", "Alabama"),
    ("02", "Alaska"),
    ("04", "Arizona"),
    ("05", "Arkansas"),
    ("06", "California"),
    ("08", "Colorado"),
    ("09", "Connecticut"),
    ("10", "Delaware"),
    ("11", "District of Columbia"),
    ("12", "Florida"),
    ("13", "Georgia"),
    ("15", "Hawaii"),
    ("16", "Idaho"),
    ("17", "Illinois"),
    ("18", "Indiana"),
    ("19", "Iowa"),
    ("20", "Kansas"),
    ("21", "Kentucky"),
    ("22", "Louisiana"),
    ("23", "Maine"),
    ("24", "Maryland"),
    ("25", "Massachusetts"),
    ("26", "Michigan"),
    ("27", "Minnesota"),
    ("28", "Mississippi"),
    ("29", "Missouri"),
    ("30", "Montana"),
    ("31", "Nebraska"),
    ("32", "Nevada"),
    ("33", "New Hampshire"),
    ("34", "New Jersey"),
    ("35", "New Mexico"),
    ("36", "New York"),
    ("37", "North Carolina"),
    ("38", "North Dakota"),
    ("39", "Ohio"),
    ("40", "Oklahoma"),
    ("41", "Oregon"),
    ("42", "Pennsylvania"),
    ("44", "Rhode Island"),
    ("45", "South Carolina"),
    ("46", "South Dakota"),
    ("47", "Tennessee"),
    ("48", "Texas"),
    ("49", "Utah"),
    ("50", "Vermont"),
    ("51", "Virginia"),
    ("53", "Washington"),
    ("54", "West Virginia"),
    ("55", "Wisconsin"),
    ("56", "Wyoming"),
];

pub fn state_name_for_fips(fips: &str) -> Option<&'static str> {
    STATE_NAMES
        .iter()
        .find(|(code, _)| *code == fips)
        .map(|(_, name)| *name)
}

/// One multi-county reporting region. The synthetic FIPS assigned to its
/// rows is the first member county's FIPS.
#[derive(Debug, Clone)]
pub struct RegionRollup {
    pub uid: i64,
    pub region: String,
    pub state_fips: String,
    pub lat: f64,
    pub long: f64,
    pub long_name: String,
    pub pop: i64,
    pub member_fips: Vec<String>,
    pub member_names: Vec<String>,
    pub member_pops: Vec<i64>,
}

impl RegionRollup {
    pub fn synthetic_fips(&self) -> &str {
        &self.member_fips[0]
    }

    pub fn state_name(&self) -> Option<&'static str> {
        state_name_for_fips(&self.state_fips)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    pub rollups: Vec<RegionRollup>,
}

impl RegionTable {
    /// Parse the region reference CSV and append the built-in Massachusetts
    /// rollup (which has no row in the Utah-focused reference file).
    pub fn load(path: &Path) -> Result<Self> {
        let mut table = Self::from_csv_path(path)?;
        table.rollups.push(Self::builtin_dukes_nantucket());
        table.verify_unambiguous()?;
        info!(rollups = table.rollups.len(), "region reference loaded");
        Ok(table)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_csv(&content)
    }

    pub fn from_csv(content: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());
        let headers = reader.headers()?.clone();

        let uid_idx = required_column(&headers, "UID")?;
        let region_idx = required_column(&headers, "Region")?;
        let state_idx = required_column(&headers, "stFIPS")?;
        let lat_idx = required_column(&headers, "Lat")?;
        let long_idx = required_column(&headers, "Long")?;
        let long_name_idx = required_column(&headers, "Long_Name")?;
        let pop_idx = required_column(&headers, "Pop")?;

        let member_slots: Vec<(Option<usize>, Option<usize>, Option<usize>)> = (0..6)
            .map(|slot| {
                (
                    optional_column(&headers, &format!("fips{slot}")),
                    optional_column(&headers, &format!("name{slot}")),
                    optional_column(&headers, &format!("pop{slot}")),
                )
            })
            .collect();

        let mut rollups = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let region = record.get(region_idx).unwrap_or("").trim().to_string();
            if region.is_empty() {
                return Err(PipelineError::Validation(format!(
                    "region reference row {} has no region name",
                    row_idx + 2
                )));
            }

            let mut member_fips = Vec::new();
            let mut member_names = Vec::new();
            let mut member_pops = Vec::new();
            for (fips_idx, name_idx, pop_idx) in &member_slots {
                let fips = fips_idx
                    .and_then(|idx| record.get(idx))
                    .map(str::trim)
                    .unwrap_or("");
                if fips.is_empty() {
                    break;
                }
                member_fips.push(fips.to_string());
                if let Some(name) = name_idx.and_then(|idx| record.get(idx)) {
                    if !name.trim().is_empty() {
                        member_names.push(name.trim().to_string());
                    }
                }
                if let Some(pop) = pop_idx.and_then(|idx| record.get(idx)) {
                    if let Ok(parsed) = pop.trim().parse::<i64>() {
                        member_pops.push(parsed);
                    }
                }
            }

            if member_fips.len() < 2 {
                return Err(PipelineError::Validation(format!(
                    "region '{}' lists fewer than two member counties",
                    region
                )));
            }

            let state_fips = record.get(state_idx).unwrap_or("").trim();
            let state_fips = if state_fips.len() == 1 {
                format!("0{state_fips}")
            } else {
                state_fips.to_string()
            };

            rollups.push(RegionRollup {
                uid: parse_i64(&record, uid_idx, row_idx, "UID")?,
                region,
                state_fips,
                lat: parse_f64(&record, lat_idx, row_idx, "Lat")?,
                long: parse_f64(&record, long_idx, row_idx, "Long")?,
                long_name: record.get(long_name_idx).unwrap_or("").trim().to_string(),
                pop: parse_i64(&record, pop_idx, row_idx, "Pop")?,
                member_fips,
                member_names,
                member_pops,
            });
        }

        Ok(Self { rollups })
    }

    /// The Dukes and Nantucket island region in Massachusetts is reported as
    /// one unit but never appears in the reference file.
    pub fn builtin_dukes_nantucket() -> RegionRollup {
        RegionRollup {
            uid: 84070002,
            region: "Dukes and Nantucket".to_string(),
            state_fips: "25".to_string(),
            lat: 41.40674725,
            long: -70.68763497,
            long_name: "Dukes-Nantucket Region MA".to_string(),
            pop: 28731,
            member_fips: vec!["25007".to_string(), "25019".to_string()],
            member_names: vec!["Dukes".to_string(), "Nantucket".to_string()],
            member_pops: vec![17332, 11399],
        }
    }

    /// All member county FIPS across rollups; these counties are excluded
    /// from the county population table so a region's aggregate population
    /// is never double counted.
    pub fn member_fips(&self) -> HashSet<String> {
        self.rollups
            .iter()
            .flat_map(|rollup| rollup.member_fips.iter().cloned())
            .collect()
    }

    fn verify_unambiguous(&self) -> Result<()> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for rollup in &self.rollups {
            if let Some(state) = seen.insert(rollup.region.as_str(), rollup.state_fips.as_str()) {
                if state != rollup.state_fips {
                    return Err(PipelineError::Validation(format!(
                        "region name '{}' appears in more than one state",
                        rollup.region
                    )));
                }
                return Err(PipelineError::Validation(format!(
                    "region '{}' is defined twice",
                    rollup.region
                )));
            }
        }
        Ok(())
    }
}

/// Back-fill FIPS-less rows that name a rollup region: synthetic FIPS,
/// centroid, long name, aggregate population, and the pipe-joined member
/// FIPS list. Adds `pop` and `member_fips` columns; rows that match no
/// rollup keep null in both.
pub fn assign_regions(df: &DataFrame, table: &RegionTable) -> Result<DataFrame> {
    let len = df.height();

    let fips = df.column("fips")?.str()?.clone();
    let county = df.column("county")?.str()?.clone();
    let state = df.column("state")?.str()?.clone();
    let lat = df.column("lat")?.f64()?.clone();
    let long = df.column("long")?.f64()?.clone();
    let long_name = df.column("long_name")?.str()?.clone();

    let by_region: HashMap<&str, &RegionRollup> = table
        .rollups
        .iter()
        .map(|rollup| (rollup.region.as_str(), rollup))
        .collect();

    let mut fips_out: Vec<Option<String>> = Vec::with_capacity(len);
    let mut lat_out: Vec<Option<f64>> = Vec::with_capacity(len);
    let mut long_out: Vec<Option<f64>> = Vec::with_capacity(len);
    let mut long_name_out: Vec<Option<String>> = Vec::with_capacity(len);
    let mut pop_out: Vec<Option<i64>> = Vec::with_capacity(len);
    let mut members_out: Vec<Option<String>> = Vec::with_capacity(len);

    let mut assigned = 0usize;

    for idx in 0..len {
        let has_fips = fips.get(idx).map_or(false, |value| !value.trim().is_empty());
        let rollup = if has_fips {
            None
        } else {
            county
                .get(idx)
                .and_then(|name| by_region.get(name.trim()).copied())
                .filter(|rollup| {
                    match (rollup.state_name(), state.get(idx)) {
                        (Some(expected), Some(actual)) => expected == actual.trim(),
                        // an unknown state FIPS cannot be scoped; fall back
                        // to the name match alone
                        (None, _) => true,
                        (_, None) => false,
                    }
                })
        };

        match rollup {
            Some(rollup) => {
                assigned += 1;
                fips_out.push(Some(rollup.synthetic_fips().to_string()));
                lat_out.push(Some(rollup.lat));
                long_out.push(Some(rollup.long));
                long_name_out.push(Some(rollup.long_name.clone()));
                pop_out.push(Some(rollup.pop));
                members_out.push(Some(rollup.member_fips.join("|")));
            }
            None => {
                fips_out.push(fips.get(idx).map(|value| value.to_string()));
                lat_out.push(lat.get(idx));
                long_out.push(long.get(idx));
                long_name_out.push(long_name.get(idx).map(|value| value.to_string()));
                pop_out.push(None);
                members_out.push(None);
            }
        }
    }

    if assigned == 0 {
        warn!("no rows matched a rollup region");
    } else {
        info!(assigned, "rollup regions assigned");
    }

    let mut output = df.clone();
    output.with_column(Series::new("fips".into(), fips_out))?;
    output.with_column(Series::new("lat".into(), lat_out))?;
    output.with_column(Series::new("long".into(), long_out))?;
    output.with_column(Series::new("long_name".into(), long_name_out))?;
    output.with_column(Series::new("pop".into(), pop_out))?;
    output.with_column(Series::new("member_fips".into(), members_out))?;

    Ok(output)
}

fn required_column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|header| header.trim() == name)
        .ok_or_else(|| {
            PipelineError::Validation(format!("region reference is missing column '{name}'"))
        })
}

fn optional_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|header| header.trim() == name)
}

fn parse_i64(record: &csv::StringRecord, idx: usize, row: usize, column: &str) -> Result<i64> {
    record
        .get(idx)
        .unwrap_or("")
        .trim()
        .parse::<i64>()
        .map_err(|err| {
            PipelineError::Validation(format!(
                "region reference row {} column '{column}': {err}",
                row + 2
            ))
        })
}

fn parse_f64(record: &csv::StringRecord, idx: usize, row: usize, column: &str) -> Result<f64> {
    record
        .get(idx)
        .unwrap_or("")
        .trim()
        .parse::<f64>()
        .map_err(|err| {
            PipelineError::Validation(format!(
                "region reference row {} column '{column}': {err}",
                row + 2
            ))
        })
}
