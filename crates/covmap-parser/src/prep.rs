use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::{debug, info, warn};

use crate::errors::PrepError;
use crate::rules::{FieldMod, FileLevel, RowFilter};
use crate::summary::{DroppedRow, PrepSummary};

/// Which deletion rules and value rewrites a prep pass applies. The default
/// is the full set used for the published map runs.
#[derive(Debug, Clone)]
pub struct PrepOptions {
    pub filters: Vec<RowFilter>,
    pub mods: Vec<FieldMod>,
}

impl Default for PrepOptions {
    fn default() -> Self {
        Self {
            filters: RowFilter::ALL.to_vec(),
            mods: FieldMod::ALL.to_vec(),
        }
    }
}

#[derive(Debug)]
pub struct PrepOutcome {
    pub cleaned: String,
    pub summary: PrepSummary,
}

struct HeaderLayout {
    header: Vec<String>,
    country_idx: Option<usize>,
    fips_idx: Option<usize>,
    name_idx: Option<usize>,
    rate_idxs: Vec<usize>,
}

/// Clean a raw JHU daily county report: rename headers, drop the country
/// column, rewrite FIPS/date/rate cells, and delete non-county rows.
pub fn prep_county(content: &str, options: &PrepOptions) -> Result<PrepOutcome, PrepError> {
    prep_content(content, FileLevel::County, options, false)
}

/// Clean a raw JHU daily state report. Surviving rows additionally get a
/// `preproc_stamp` column carrying their source line number.
pub fn prep_state(content: &str, options: &PrepOptions) -> Result<PrepOutcome, PrepError> {
    prep_content(content, FileLevel::State, options, true)
}

pub fn prep_county_file(
    input: &Path,
    output: &Path,
    options: &PrepOptions,
) -> Result<PrepSummary, PrepError> {
    let content = fs::read_to_string(input)?;
    let outcome = prep_county(&content, options)?;
    fs::write(output, &outcome.cleaned)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        rows_written = outcome.summary.rows_written,
        rows_dropped = outcome.summary.rows_dropped,
        "county prep finished"
    );
    Ok(outcome.summary)
}

pub fn prep_state_file(
    input: &Path,
    output: &Path,
    options: &PrepOptions,
) -> Result<PrepSummary, PrepError> {
    let content = fs::read_to_string(input)?;
    let outcome = prep_state(&content, options)?;
    fs::write(output, &outcome.cleaned)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        rows_written = outcome.summary.rows_written,
        rows_dropped = outcome.summary.rows_dropped,
        "state prep finished"
    );
    Ok(outcome.summary)
}

/// Find the newest `MM-DD-YYYY.csv` daily report under `dir`.
pub fn latest_daily_report(dir: &Path) -> Result<PathBuf, PrepError> {
    let pattern = dir.join("*.csv").to_string_lossy().into_owned();
    let mut best: Option<(NaiveDate, PathBuf)> = None;

    for entry in glob::glob(&pattern)? {
        let Ok(path) = entry else {
            continue;
        };
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(stem, "%m-%d-%Y") else {
            continue;
        };
        if best.as_ref().map_or(true, |(existing, _)| date > *existing) {
            best = Some((date, path));
        }
    }

    best.map(|(_, path)| path)
        .ok_or_else(|| PrepError::NoDailyReports {
            dir: dir.display().to_string(),
        })
}

fn prep_content(
    content: &str,
    level: FileLevel,
    options: &PrepOptions,
    stamp_rows: bool,
) -> Result<PrepOutcome, PrepError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut records = reader.records();

    let raw_header = records.next().ok_or(PrepError::MissingHeader)??;
    let layout = normalize_header(&raw_header, level);

    let mut out = Vec::new();
    let mut summary = PrepSummary::default();
    {
        let mut writer = csv::Writer::from_writer(&mut out);

        let mut header = layout.header.clone();
        if stamp_rows {
            header.push("preproc_stamp".to_string());
        }
        writer.write_record(&header)?;

        for record in records {
            let record = record?;
            let line = record.position().map(|pos| pos.line()).unwrap_or(0);
            summary.rows_read += 1;

            let raw: String = record.iter().collect::<Vec<_>>().join(",");
            let mut row: Vec<String> = record.iter().map(|cell| cell.to_string()).collect();

            if let Some(idx) = layout.country_idx {
                if idx < row.len() {
                    row.remove(idx);
                }
            }

            apply_mods(&mut row, &layout, options);

            let fips = cell(&row, layout.fips_idx);
            let name = cell(&row, layout.name_idx);
            if let Some(rule) = options
                .filters
                .iter()
                .find(|rule| rule.matches(level, fips, name))
            {
                debug!(line, rule = rule.key(), "dropping raw row");
                summary.rows_dropped += 1;
                summary.dropped.push(DroppedRow {
                    line,
                    rule: rule.key(),
                    raw,
                });
                continue;
            }

            if stamp_rows {
                row.push(line.to_string());
            }
            writer.write_record(&row)?;
            summary.rows_written += 1;
        }

        writer.flush()?;
    }

    if summary.rows_read == 0 {
        return Err(PrepError::EmptyFile);
    }

    let cleaned = String::from_utf8(out)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    Ok(PrepOutcome { cleaned, summary })
}

fn normalize_header(raw: &csv::StringRecord, level: FileLevel) -> HeaderLayout {
    let mut header: Vec<String> = raw.iter().map(|cell| cell.trim().to_string()).collect();

    if let Some(idx) = header.iter().position(|name| name == "Admin2") {
        header[idx] = "County".to_string();
    } else if level == FileLevel::County {
        warn!("Admin2 column not found in raw header");
    }

    if let Some(idx) = header.iter().position(|name| name == "Province_State") {
        header[idx] = "State".to_string();
    } else {
        warn!("Province_State column not found in raw header");
    }

    let country_idx = header.iter().position(|name| name == "Country_Region");
    if let Some(idx) = country_idx {
        header.remove(idx);
    } else {
        warn!("Country_Region column not found, nothing to delete");
    }

    let fips_idx = header.iter().position(|name| name == "FIPS");
    let name_idx = match level {
        FileLevel::County => header.iter().position(|name| name == "County"),
        FileLevel::State => header.iter().position(|name| name == "State"),
    };
    let rate_idxs = header
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() == "Incident_Rate" || name.as_str() == "Case_Fatality_Ratio")
        .map(|(idx, _)| idx)
        .collect();

    HeaderLayout {
        header,
        country_idx,
        fips_idx,
        name_idx,
        rate_idxs,
    }
}

fn apply_mods(row: &mut [String], layout: &HeaderLayout, options: &PrepOptions) {
    for modification in &options.mods {
        match modification {
            FieldMod::PadFips => {
                if let Some(idx) = layout.fips_idx {
                    if let Some(padded) = row.get(idx).and_then(|cell| FieldMod::pad_fips(cell)) {
                        row[idx] = padded;
                    }
                }
            }
            FieldMod::DateOnly => {
                for cell in row.iter_mut() {
                    if let Some(truncated) = FieldMod::date_only(cell) {
                        *cell = truncated;
                    }
                }
            }
            FieldMod::RoundRates => {
                for &idx in &layout.rate_idxs {
                    if let Some(cell) = row.get(idx) {
                        row[idx] = FieldMod::round_rate(cell);
                    }
                }
            }
        }
    }
}

fn cell<'a>(row: &'a [String], idx: Option<usize>) -> &'a str {
    idx.and_then(|idx| row.get(idx))
        .map(String::as_str)
        .unwrap_or("")
}
