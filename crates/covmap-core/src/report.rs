use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Table};
use polars::prelude::*;

use crate::error::Result;

/// Top `n` counties by deaths per 100 people, as a terminal table.
pub fn county_table(df: &DataFrame, top: usize) -> Result<Table> {
    let sorted = df.sort(
        ["deaths_to_pop"],
        SortMultipleOptions::default().with_order_descending(true),
    )?;

    let fips = sorted.column("fips")?.str()?.clone();
    let county = sorted.column("county")?.str()?.clone();
    let state = sorted.column("state")?.str()?.clone();
    let confirmed = sorted.column("confirmed")?.i64()?.clone();
    let deaths = sorted.column("deaths")?.i64()?.clone();
    let cases_to_pop = sorted.column("cases_to_pop")?.f64()?.clone();
    let deaths_to_pop = sorted.column("deaths_to_pop")?.f64()?.clone();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "FIPS",
        "County",
        "State",
        "Confirmed",
        "Deaths",
        "Cases/100",
        "Deaths/100",
    ]);

    for idx in 0..sorted.height().min(top) {
        table.add_row(vec![
            Cell::new(fips.get(idx).unwrap_or("")),
            Cell::new(county.get(idx).unwrap_or("")),
            Cell::new(state.get(idx).unwrap_or("")),
            numeric_cell(confirmed.get(idx).map(|value| value.to_string())),
            numeric_cell(deaths.get(idx).map(|value| value.to_string())),
            numeric_cell(cases_to_pop.get(idx).map(|value| format!("{value:.2}"))),
            numeric_cell(deaths_to_pop.get(idx).map(|value| format!("{value:.2}"))),
        ]);
    }

    Ok(table)
}

/// Top `n` states by fatality rate.
pub fn state_table(df: &DataFrame, top: usize) -> Result<Table> {
    let sorted = df.sort(
        ["fatality_rate"],
        SortMultipleOptions::default().with_order_descending(true),
    )?;

    let fips = sorted.column("fips")?.str()?.clone();
    let state = sorted.column("state")?.str()?.clone();
    let abbrev = sorted.column("abbrev")?.str()?.clone();
    let confirmed = sorted.column("confirmed")?.i64()?.clone();
    let deaths = sorted.column("deaths")?.i64()?.clone();
    let fatality_rate = sorted.column("fatality_rate")?.f64()?.clone();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "FIPS",
        "State",
        "Abbrev",
        "Confirmed",
        "Deaths",
        "Fatality rate",
    ]);

    for idx in 0..sorted.height().min(top) {
        table.add_row(vec![
            Cell::new(fips.get(idx).unwrap_or("")),
            Cell::new(state.get(idx).unwrap_or("")),
            Cell::new(abbrev.get(idx).unwrap_or("")),
            numeric_cell(confirmed.get(idx).map(|value| value.to_string())),
            numeric_cell(deaths.get(idx).map(|value| value.to_string())),
            numeric_cell(fatality_rate.get(idx).map(|value| format!("{value:.2}"))),
        ]);
    }

    Ok(table)
}

fn numeric_cell(value: Option<String>) -> Cell {
    Cell::new(value.unwrap_or_default()).set_alignment(CellAlignment::Right)
}
