use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use polars::prelude::*;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::regions::{assign_regions, RegionTable};

/// County population reference keyed on 5-digit FIPS. Counties that belong
/// to a rollup region are excluded at load time so the region's aggregate
/// population is the only one in play.
#[derive(Debug, Clone, Default)]
pub struct CountyPopulation {
    by_fips: BTreeMap<String, i64>,
}

impl CountyPopulation {
    pub fn from_csv_path(path: &Path, exclude: &RegionTable) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_csv(&content, exclude)
    }

    pub fn from_csv(content: &str, exclude: &RegionTable) -> Result<Self> {
        let excluded = exclude.member_fips();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());
        let headers = reader.headers()?.clone();
        let fips_idx = required_column(&headers, &["FIPS", "fips"], "county population")?;
        let pop_idx = required_column(&headers, &["Pop", "pop"], "county population")?;

        let mut by_fips = BTreeMap::new();
        let mut dropped = 0usize;
        for record in reader.records() {
            let record = record?;
            let fips = pad_fips(record.get(fips_idx).unwrap_or(""), 5);
            if fips.is_empty() {
                continue;
            }
            if excluded.contains(&fips) {
                dropped += 1;
                continue;
            }
            let pop = record
                .get(pop_idx)
                .unwrap_or("")
                .trim()
                .parse::<i64>()
                .map_err(|err| {
                    PipelineError::Validation(format!(
                        "county population for fips {fips} is not an integer: {err}"
                    ))
                })?;
            if by_fips.insert(fips.clone(), pop).is_some() {
                return Err(PipelineError::Validation(format!(
                    "duplicate county fips {fips} in population file"
                )));
            }
        }

        info!(
            counties = by_fips.len(),
            rollup_members_dropped = dropped,
            "county population loaded"
        );
        Ok(Self { by_fips })
    }

    pub fn get(&self, fips: &str) -> Option<i64> {
        self.by_fips.get(fips).copied()
    }

    pub fn len(&self) -> usize {
        self.by_fips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fips.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StatePopRow {
    pub state: String,
    pub pop: i64,
    pub abbrev: Option<String>,
}

/// State population reference keyed on 2-digit FIPS.
#[derive(Debug, Clone, Default)]
pub struct StatePopulation {
    by_fips: BTreeMap<String, StatePopRow>,
}

impl StatePopulation {
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_csv(&content)
    }

    pub fn from_csv(content: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());
        let headers = reader.headers()?.clone();
        let state_idx = required_column(&headers, &["State", "state"], "state population")?;
        let fips_idx = required_column(&headers, &["FIPS", "fips"], "state population")?;
        let pop_idx = required_column(&headers, &["Pop", "pop"], "state population")?;
        let abbrev_idx = optional_column(&headers, &["Abbrev", "abbrev"]);

        let mut by_fips = BTreeMap::new();
        for record in reader.records() {
            let record = record?;
            let fips = pad_fips(record.get(fips_idx).unwrap_or(""), 2);
            if fips.is_empty() {
                continue;
            }
            let pop = record
                .get(pop_idx)
                .unwrap_or("")
                .trim()
                .parse::<i64>()
                .map_err(|err| {
                    PipelineError::Validation(format!(
                        "state population for fips {fips} is not an integer: {err}"
                    ))
                })?;
            let row = StatePopRow {
                state: record.get(state_idx).unwrap_or("").trim().to_string(),
                pop,
                abbrev: abbrev_idx
                    .and_then(|idx| record.get(idx))
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string),
            };
            if by_fips.insert(fips.clone(), row).is_some() {
                return Err(PipelineError::Validation(format!(
                    "duplicate state fips {fips} in population file"
                )));
            }
        }

        info!(states = by_fips.len(), "state population loaded");
        Ok(Self { by_fips })
    }

    pub fn get(&self, fips: &str) -> Option<&StatePopRow> {
        self.by_fips.get(fips)
    }

    pub fn len(&self) -> usize {
        self.by_fips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fips.is_empty()
    }
}

/// Load the cleaned JHU county report, reconcile rollup regions, back-fill
/// population, and derive the per-100-person case and death ratios.
pub fn load_county_cases(
    path: &Path,
    regions: &RegionTable,
    pop: &CountyPopulation,
) -> Result<DataFrame> {
    let content = fs::read_to_string(path)?;
    load_county_cases_from_csv(&content, regions, pop)
}

pub fn load_county_cases_from_csv(
    content: &str,
    regions: &RegionTable,
    pop: &CountyPopulation,
) -> Result<DataFrame> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    let fips_idx = required_column(&headers, &["FIPS"], "county cases")?;
    let county_idx = required_column(&headers, &["County", "Admin2"], "county cases")?;
    let state_idx = required_column(&headers, &["State", "Province_State"], "county cases")?;
    let updated_idx = required_column(&headers, &["Last_Update"], "county cases")?;
    let lat_idx = optional_column(&headers, &["Lat"]);
    let long_idx = optional_column(&headers, &["Long_", "Long"]);
    let confirmed_idx = required_column(&headers, &["Confirmed"], "county cases")?;
    let deaths_idx = required_column(&headers, &["Deaths"], "county cases")?;
    let active_idx = optional_column(&headers, &["Active"]);
    let combined_idx = optional_column(&headers, &["Combined_Key"]);
    let cfr_idx = optional_column(&headers, &["Case_Fatality_Ratio"]);

    let mut fips = Vec::new();
    let mut county = Vec::new();
    let mut state = Vec::new();
    let mut updated = Vec::new();
    let mut lat = Vec::new();
    let mut long = Vec::new();
    let mut long_name = Vec::new();
    let mut confirmed = Vec::new();
    let mut deaths = Vec::new();
    let mut active = Vec::new();
    let mut case_fatality_ratio = Vec::new();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        fips.push(non_empty(&record, fips_idx));
        county.push(non_empty(&record, county_idx));
        state.push(non_empty(&record, state_idx));
        updated.push(parse_date(&record, updated_idx, row_idx, "Last_Update")?);
        lat.push(parse_opt_f64(&record, lat_idx, row_idx, "Lat")?);
        long.push(parse_opt_f64(&record, long_idx, row_idx, "Long_")?);
        long_name.push(combined_idx.and_then(|idx| non_empty(&record, idx)));
        confirmed.push(parse_opt_i64(&record, Some(confirmed_idx), row_idx, "Confirmed")?);
        deaths.push(parse_opt_i64(&record, Some(deaths_idx), row_idx, "Deaths")?);
        active.push(parse_opt_i64(&record, active_idx, row_idx, "Active")?);
        case_fatality_ratio.push(parse_opt_f64(&record, cfr_idx, row_idx, "Case_Fatality_Ratio")?);
    }

    if fips.is_empty() {
        return Err(PipelineError::Validation(
            "county cases file contained no data rows".to_string(),
        ));
    }

    let fips: Vec<Option<String>> = fips
        .into_iter()
        .map(|value| value.map(|code| pad_fips(&code, 5)))
        .collect();

    let df = DataFrame::new(vec![
        Series::new("fips".into(), fips).into(),
        Series::new("county".into(), county).into(),
        Series::new("state".into(), state).into(),
        date_series("updated", updated)?.into(),
        Series::new("lat".into(), lat).into(),
        Series::new("long".into(), long).into(),
        Series::new("long_name".into(), long_name).into(),
        Series::new("confirmed".into(), confirmed).into(),
        Series::new("deaths".into(), deaths).into(),
        Series::new("active".into(), active).into(),
        Series::new("case_fatality_ratio".into(), case_fatality_ratio).into(),
    ])?;

    let df = assign_regions(&df, regions)?;
    let df = drop_missing_fips(&df)?;
    verify_unique_strings(&df, "fips", "county cases")?;
    let df = df.sort(["fips"], SortMultipleOptions::default())?;

    let df = backfill_population(&df, pop)?;
    derive_county_ratios(&df)
}

/// Load the cleaned JHU state report and join state population, deriving the
/// per-100-person fatality rate.
pub fn load_state_cases(path: &Path, pop: &StatePopulation) -> Result<DataFrame> {
    let content = fs::read_to_string(path)?;
    load_state_cases_from_csv(&content, pop)
}

pub fn load_state_cases_from_csv(content: &str, pop: &StatePopulation) -> Result<DataFrame> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    let state_idx = required_column(&headers, &["State", "Province_State"], "state cases")?;
    let updated_idx = required_column(&headers, &["Last_Update"], "state cases")?;
    let fips_idx = required_column(&headers, &["FIPS"], "state cases")?;
    let lat_idx = optional_column(&headers, &["Lat"]);
    let long_idx = optional_column(&headers, &["Long_", "Long"]);
    let confirmed_idx = required_column(&headers, &["Confirmed"], "state cases")?;
    let deaths_idx = required_column(&headers, &["Deaths"], "state cases")?;
    let active_idx = optional_column(&headers, &["Active"]);
    let stamp_idx = optional_column(&headers, &["preproc_stamp"]);

    let mut state = Vec::new();
    let mut updated = Vec::new();
    let mut fips = Vec::new();
    let mut lat = Vec::new();
    let mut long = Vec::new();
    let mut confirmed = Vec::new();
    let mut deaths = Vec::new();
    let mut active = Vec::new();
    let mut stamp = Vec::new();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let code = non_empty(&record, fips_idx);
        let Some(code) = code else {
            warn!(row = row_idx + 2, "state row without FIPS skipped");
            continue;
        };
        fips.push(pad_fips(&code, 2));
        state.push(non_empty(&record, state_idx));
        updated.push(parse_date(&record, updated_idx, row_idx, "Last_Update")?);
        lat.push(parse_opt_f64(&record, lat_idx, row_idx, "Lat")?);
        long.push(parse_opt_f64(&record, long_idx, row_idx, "Long_")?);
        confirmed.push(parse_opt_i64(&record, Some(confirmed_idx), row_idx, "Confirmed")?);
        deaths.push(parse_opt_i64(&record, Some(deaths_idx), row_idx, "Deaths")?);
        active.push(parse_opt_i64(&record, active_idx, row_idx, "Active")?);
        stamp.push(parse_opt_i64(&record, stamp_idx, row_idx, "preproc_stamp")?);
    }

    if fips.is_empty() {
        return Err(PipelineError::Validation(
            "state cases file contained no data rows".to_string(),
        ));
    }

    let mut pops: Vec<Option<i64>> = Vec::with_capacity(fips.len());
    let mut abbrevs: Vec<Option<String>> = Vec::with_capacity(fips.len());
    let mut fatality_rate: Vec<Option<f64>> = Vec::with_capacity(fips.len());
    for (idx, code) in fips.iter().enumerate() {
        let row = pop.get(code);
        if row.is_none() {
            warn!(fips = code.as_str(), "state has no population row");
        }
        pops.push(row.map(|row| row.pop));
        abbrevs.push(row.and_then(|row| row.abbrev.clone()));
        fatality_rate.push(match (deaths[idx], row.map(|row| row.pop)) {
            (Some(deaths), Some(pop)) if pop > 0 => {
                Some(round2(100.0 * deaths as f64 / pop as f64))
            }
            _ => None,
        });
    }

    let df = DataFrame::new(vec![
        Series::new("fips".into(), fips).into(),
        Series::new("state".into(), state).into(),
        date_series("updated", updated)?.into(),
        Series::new("lat".into(), lat).into(),
        Series::new("long".into(), long).into(),
        Series::new("confirmed".into(), confirmed).into(),
        Series::new("deaths".into(), deaths).into(),
        Series::new("active".into(), active).into(),
        Series::new("preproc_stamp".into(), stamp).into(),
        Series::new("pop".into(), pops).into(),
        Series::new("abbrev".into(), abbrevs).into(),
        Series::new("fatality_rate".into(), fatality_rate).into(),
    ])?;

    verify_unique_strings(&df, "fips", "state cases")?;
    Ok(df.sort(["fips"], SortMultipleOptions::default())?)
}

/// Load the NYT county time series. The composite (fips, date) key must be
/// unique; rows without a FIPS are dropped.
pub fn load_nyt_series(path: &Path) -> Result<DataFrame> {
    let content = fs::read_to_string(path)?;
    load_nyt_series_from_csv(&content)
}

pub fn load_nyt_series_from_csv(content: &str) -> Result<DataFrame> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    let date_idx = required_column(&headers, &["date"], "nyt series")?;
    let county_idx = required_column(&headers, &["county"], "nyt series")?;
    let state_idx = required_column(&headers, &["state"], "nyt series")?;
    let fips_idx = required_column(&headers, &["fips"], "nyt series")?;
    let cases_idx = required_column(&headers, &["cases"], "nyt series")?;
    let deaths_idx = required_column(&headers, &["deaths"], "nyt series")?;

    let mut fips = Vec::new();
    let mut date = Vec::new();
    let mut county = Vec::new();
    let mut state = Vec::new();
    let mut cases = Vec::new();
    let mut deaths = Vec::new();

    let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();
    let mut skipped = 0usize;

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let Some(code) = non_empty(&record, fips_idx) else {
            skipped += 1;
            continue;
        };
        let code = pad_fips(&code, 5);
        let Some(day) = parse_date(&record, date_idx, row_idx, "date")? else {
            skipped += 1;
            continue;
        };
        if !seen.insert((code.clone(), day)) {
            return Err(PipelineError::Validation(format!(
                "duplicate nyt series key ({code}, {day})"
            )));
        }
        fips.push(code);
        date.push(Some(day));
        county.push(non_empty(&record, county_idx));
        state.push(non_empty(&record, state_idx));
        cases.push(parse_opt_i64(&record, Some(cases_idx), row_idx, "cases")?);
        deaths.push(parse_opt_i64(&record, Some(deaths_idx), row_idx, "deaths")?);
    }

    if fips.is_empty() {
        return Err(PipelineError::Validation(
            "nyt series contained no usable rows".to_string(),
        ));
    }
    if skipped > 0 {
        info!(skipped, "nyt rows without fips or date dropped");
    }

    let df = DataFrame::new(vec![
        Series::new("fips".into(), fips).into(),
        date_series("date", date)?.into(),
        Series::new("county".into(), county).into(),
        Series::new("state".into(), state).into(),
        Series::new("cases".into(), cases).into(),
        Series::new("deaths".into(), deaths).into(),
    ])?;

    Ok(df.sort(["fips", "date"], SortMultipleOptions::default())?)
}

fn drop_missing_fips(df: &DataFrame) -> Result<DataFrame> {
    let fips = df.column("fips")?.str()?;
    let mask: Vec<bool> = (0..df.height())
        .map(|idx| fips.get(idx).map_or(false, |value| !value.trim().is_empty()))
        .collect();
    let dropped = mask.iter().filter(|keep| !**keep).count();
    if dropped > 0 {
        info!(dropped, "rows without fips dropped");
    }
    let mask = BooleanChunked::from_slice("mask".into(), &mask);
    Ok(df.filter(&mask)?)
}

fn backfill_population(df: &DataFrame, pop: &CountyPopulation) -> Result<DataFrame> {
    let fips = df.column("fips")?.str()?;
    let existing = df.column("pop")?.i64()?;

    let mut filled: Vec<Option<i64>> = Vec::with_capacity(df.height());
    let mut missing = 0usize;
    for idx in 0..df.height() {
        let value = existing
            .get(idx)
            .or_else(|| fips.get(idx).and_then(|code| pop.get(code)));
        if value.is_none() {
            missing += 1;
        }
        filled.push(value);
    }
    if missing > 0 {
        warn!(missing, "counties with no population reference");
    }

    let mut output = df.clone();
    output.with_column(Series::new("pop".into(), filled))?;
    Ok(output)
}

fn derive_county_ratios(df: &DataFrame) -> Result<DataFrame> {
    let len = df.height();
    let pop = df.column("pop")?.i64()?;
    let confirmed = df.column("confirmed")?.i64()?;
    let deaths = df.column("deaths")?.i64()?;

    let mut cases_to_pop = Vec::with_capacity(len);
    let mut deaths_to_pop = Vec::with_capacity(len);
    for idx in 0..len {
        let ratio = |count: Option<i64>| match (count, pop.get(idx)) {
            (Some(count), Some(pop)) if pop > 0 => 100.0 * count as f64 / pop as f64,
            _ => 0.0,
        };
        cases_to_pop.push(ratio(confirmed.get(idx)));
        deaths_to_pop.push(ratio(deaths.get(idx)));
    }

    let mut output = df.clone();
    output.hstack_mut(&mut [
        Series::new("cases_to_pop".into(), cases_to_pop).into(),
        Series::new("deaths_to_pop".into(), deaths_to_pop).into(),
    ])?;
    Ok(output)
}

fn verify_unique_strings(df: &DataFrame, column: &str, label: &str) -> Result<()> {
    let values = df.column(column)?.str()?;
    let mut seen = HashSet::new();
    for idx in 0..df.height() {
        if let Some(value) = values.get(idx) {
            if !seen.insert(value.to_string()) {
                return Err(PipelineError::Validation(format!(
                    "duplicate {column} '{value}' in {label}"
                )));
            }
        }
    }
    Ok(())
}

/// Build a polars Date series from chrono dates.
fn date_series(name: &str, dates: Vec<Option<NaiveDate>>) -> Result<Series> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch is a valid date");
    let days: Vec<Option<i32>> = dates
        .into_iter()
        .map(|date| date.map(|date| (date - epoch).num_days() as i32))
        .collect();
    Ok(Series::new(name.into(), days).cast(&DataType::Date)?)
}

fn pad_fips(raw: &str, width: usize) -> String {
    let trimmed = raw.trim();
    // tolerate float-formatted codes ("1.0") from spreadsheet round trips
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return trimmed.to_string();
    }
    format!("{:0>width$}", trimmed, width = width)
}

fn required_column(headers: &StringRecord, names: &[&str], context: &str) -> Result<usize> {
    optional_column(headers, names).ok_or_else(|| {
        PipelineError::Validation(format!(
            "{context} file is missing a required column (one of {names:?})"
        ))
    })
}

fn optional_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.iter().any(|name| header.trim() == *name))
}

fn non_empty(record: &StringRecord, idx: usize) -> Option<String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_date(
    record: &StringRecord,
    idx: usize,
    row_idx: usize,
    column: &str,
) -> Result<Option<NaiveDate>> {
    let Some(value) = record.get(idx).map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    static FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Ok(Some(date));
        }
        // date-time cells that escaped the prep pass
        if let Ok(date) = NaiveDate::parse_from_str(value.split(' ').next().unwrap_or(value), format)
        {
            return Ok(Some(date));
        }
    }
    Err(PipelineError::Validation(format!(
        "row {} column '{column}': invalid date '{value}'",
        row_idx + 2
    )))
}

fn parse_opt_i64(
    record: &StringRecord,
    idx: Option<usize>,
    row_idx: usize,
    column: &str,
) -> Result<Option<i64>> {
    let Some(idx) = idx else {
        return Ok(None);
    };
    let Some(value) = record.get(idx).map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    value.parse::<i64>().map(Some).map_err(|err| {
        PipelineError::Validation(format!(
            "row {} column '{column}': invalid integer '{value}': {err}",
            row_idx + 2
        ))
    })
}

fn parse_opt_f64(
    record: &StringRecord,
    idx: Option<usize>,
    row_idx: usize,
    column: &str,
) -> Result<Option<f64>> {
    let Some(idx) = idx else {
        return Ok(None);
    };
    let Some(value) = record.get(idx).map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    value.parse::<f64>().map(Some).map_err(|err| {
        PipelineError::Validation(format!(
            "row {} column '{column}': invalid float '{value}': {err}",
            row_idx + 2
        ))
    })
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
