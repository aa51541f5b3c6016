use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::tables::{round2, CountyPopulation};

const LOOKBACK_DAYS: [i32; 3] = [30, 60, 90];

/// The most recent report snapshot of a county time series, with the
/// cumulative counts observed exactly 30/60/90 days earlier attached.
#[derive(Debug)]
pub struct TrailingSnapshot {
    pub df: DataFrame,
    pub as_of: NaiveDate,
}

/// Reduce the NYT time series to its newest date and attach the trailing
/// cumulative counts per county. A county with no report dated exactly N
/// days before the as-of date gets nulls for that window.
pub fn trailing_snapshot(series: &DataFrame) -> Result<TrailingSnapshot> {
    let len = series.height();
    if len == 0 {
        return Err(PipelineError::Validation(
            "time series is empty".to_string(),
        ));
    }

    let fips = series.column("fips")?.str()?;
    let date = series.column("date")?.date()?;
    let county = series.column("county")?.str()?;
    let state = series.column("state")?.str()?;
    let cases = series.column("cases")?.i64()?;
    let deaths = series.column("deaths")?.i64()?;

    let mut newest: Option<i32> = None;
    for idx in 0..len {
        if let Some(day) = date.get(idx) {
            newest = Some(newest.map_or(day, |existing| existing.max(day)));
        }
    }
    let as_of_days = newest
        .ok_or_else(|| PipelineError::Validation("time series has no dates".to_string()))?;

    // (fips, day) -> row index, for the exact-date lookbacks
    let mut by_key: HashMap<(&str, i32), usize> = HashMap::with_capacity(len);
    for idx in 0..len {
        if let (Some(code), Some(day)) = (fips.get(idx), date.get(idx)) {
            by_key.insert((code, day), idx);
        }
    }

    let mut out_fips: Vec<Option<String>> = Vec::new();
    let mut out_date: Vec<Option<i32>> = Vec::new();
    let mut out_county: Vec<Option<String>> = Vec::new();
    let mut out_state: Vec<Option<String>> = Vec::new();
    let mut out_cases: Vec<Option<i64>> = Vec::new();
    let mut out_deaths: Vec<Option<i64>> = Vec::new();
    let mut lagged: [(Vec<Option<i64>>, Vec<Option<i64>>); 3] =
        [(Vec::new(), Vec::new()), (Vec::new(), Vec::new()), (Vec::new(), Vec::new())];

    for idx in 0..len {
        if date.get(idx) != Some(as_of_days) {
            continue;
        }
        let Some(code) = fips.get(idx) else {
            continue;
        };

        out_fips.push(Some(code.to_string()));
        out_date.push(Some(as_of_days));
        out_county.push(county.get(idx).map(str::to_string));
        out_state.push(state.get(idx).map(str::to_string));
        out_cases.push(cases.get(idx));
        out_deaths.push(deaths.get(idx));

        for (slot, days) in LOOKBACK_DAYS.iter().enumerate() {
            let prior = by_key.get(&(code, as_of_days - days)).copied();
            lagged[slot].0.push(prior.and_then(|row| cases.get(row)));
            lagged[slot].1.push(prior.and_then(|row| deaths.get(row)));
        }
    }

    info!(
        counties = out_fips.len(),
        as_of = %date_from_days(as_of_days),
        "trailing snapshot built"
    );

    let [(cases_30, deaths_30), (cases_60, deaths_60), (cases_90, deaths_90)] = lagged;

    let df = DataFrame::new(vec![
        Series::new("fips".into(), out_fips).into(),
        Series::new("date".into(), out_date)
            .cast(&DataType::Date)?
            .into(),
        Series::new("county".into(), out_county).into(),
        Series::new("state".into(), out_state).into(),
        Series::new("cases".into(), out_cases).into(),
        Series::new("deaths".into(), out_deaths).into(),
        Series::new("cases_30".into(), cases_30).into(),
        Series::new("deaths_30".into(), deaths_30).into(),
        Series::new("cases_60".into(), cases_60).into(),
        Series::new("deaths_60".into(), deaths_60).into(),
        Series::new("cases_90".into(), cases_90).into(),
        Series::new("deaths_90".into(), deaths_90).into(),
    ])?;

    Ok(TrailingSnapshot {
        df,
        as_of: date_from_days(as_of_days),
    })
}

/// Join the county population reference onto the snapshot.
pub fn attach_population(df: &DataFrame, pop: &CountyPopulation) -> Result<DataFrame> {
    let fips = df.column("fips")?.str()?;
    let values: Vec<Option<i64>> = (0..df.height())
        .map(|idx| fips.get(idx).and_then(|code| pop.get(code)))
        .collect();

    let mut output = df.clone();
    output.with_column(Series::new("pop".into(), values))?;
    Ok(output)
}

/// Derive the case rate and the windowed death-delta-to-case-delta ratios.
/// Any window with a missing operand or a non-positive case delta yields
/// null rather than an infinite or negative rate.
pub fn derive_rates(df: &DataFrame) -> Result<DataFrame> {
    let len = df.height();
    let pop = df.column("pop")?.i64()?;
    let cases = df.column("cases")?.i64()?;
    let deaths = df.column("deaths")?.i64()?;
    let cases_30 = df.column("cases_30")?.i64()?;
    let deaths_30 = df.column("deaths_30")?.i64()?;
    let cases_60 = df.column("cases_60")?.i64()?;
    let deaths_60 = df.column("deaths_60")?.i64()?;
    let cases_90 = df.column("cases_90")?.i64()?;
    let deaths_90 = df.column("deaths_90")?.i64()?;

    let mut case_rate = Vec::with_capacity(len);
    let mut dd_to_dc = Vec::with_capacity(len);
    let mut dd_to_dc_30 = Vec::with_capacity(len);
    let mut dd_to_dc_60 = Vec::with_capacity(len);

    for idx in 0..len {
        case_rate.push(match (cases.get(idx), pop.get(idx)) {
            (Some(cases), Some(pop)) if pop > 0 => Some(round2(100.0 * cases as f64 / pop as f64)),
            _ => None,
        });
        dd_to_dc.push(lagged_ratio(
            deaths.get(idx),
            deaths_30.get(idx),
            cases.get(idx),
            cases_30.get(idx),
        ));
        dd_to_dc_30.push(lagged_ratio(
            deaths_30.get(idx),
            deaths_60.get(idx),
            cases_30.get(idx),
            cases_60.get(idx),
        ));
        dd_to_dc_60.push(lagged_ratio(
            deaths_60.get(idx),
            deaths_90.get(idx),
            cases_60.get(idx),
            cases_90.get(idx),
        ));
    }

    let mut output = df.clone();
    output.hstack_mut(&mut [
        Series::new("case_rate".into(), case_rate).into(),
        Series::new("dd_to_dc".into(), dd_to_dc).into(),
        Series::new("dd_to_dc_30".into(), dd_to_dc_30).into(),
        Series::new("dd_to_dc_60".into(), dd_to_dc_60).into(),
    ])?;
    Ok(output)
}

/// Newest date in a Date column, for plot titles and summaries.
pub fn max_date(df: &DataFrame, column: &str) -> Result<NaiveDate> {
    let date = df.column(column)?.date()?;
    let mut newest: Option<i32> = None;
    for idx in 0..df.height() {
        if let Some(day) = date.get(idx) {
            newest = Some(newest.map_or(day, |existing| existing.max(day)));
        }
    }
    newest
        .map(date_from_days)
        .ok_or_else(|| PipelineError::Validation(format!("column '{column}' has no dates")))
}

fn lagged_ratio(
    deaths_new: Option<i64>,
    deaths_old: Option<i64>,
    cases_new: Option<i64>,
    cases_old: Option<i64>,
) -> Option<f64> {
    let (Some(deaths_new), Some(deaths_old), Some(cases_new), Some(cases_old)) =
        (deaths_new, deaths_old, cases_new, cases_old)
    else {
        return None;
    };
    let case_delta = cases_new - cases_old;
    if case_delta <= 0 {
        return None;
    }
    Some(round2((deaths_new - deaths_old) as f64 / case_delta as f64))
}

pub(crate) fn date_from_days(days: i32) -> NaiveDate {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch is a valid date");
    epoch + chrono::Duration::days(days as i64)
}
