use std::fs;
use std::path::PathBuf;

use csv::ReaderBuilder;

use crate::errors::PrepError;
use crate::prep::{latest_daily_report, prep_county, prep_state, PrepOptions};

fn fixture(name: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let full_path = base.join("tests/data").join(name);
    fs::read_to_string(&full_path)
        .unwrap_or_else(|err| panic!("failed to read fixture {}: {}", full_path.display(), err))
}

fn rows(cleaned: &str) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .from_reader(cleaned.as_bytes());
    let mut records = reader.records();
    let header: Vec<String> = records
        .next()
        .expect("cleaned output missing header")
        .expect("cleaned header readable")
        .iter()
        .map(|cell| cell.to_string())
        .collect();
    let body = records
        .map(|record| {
            record
                .expect("cleaned row readable")
                .iter()
                .map(|cell| cell.to_string())
                .collect()
        })
        .collect();
    (header, body)
}

#[test]
fn county_prep_normalizes_header() {
    let outcome =
        prep_county(&fixture("12-09-2020.csv"), &PrepOptions::default()).expect("prep failed");
    let (header, _) = rows(&outcome.cleaned);

    assert_eq!(
        header,
        vec![
            "FIPS",
            "County",
            "State",
            "Last_Update",
            "Lat",
            "Long_",
            "Confirmed",
            "Deaths",
            "Recovered",
            "Active",
            "Combined_Key",
            "Incident_Rate",
            "Case_Fatality_Ratio",
        ]
    );
}

#[test]
fn county_prep_drops_non_county_rows_but_keeps_region_rows() {
    let outcome =
        prep_county(&fixture("12-09-2020.csv"), &PrepOptions::default()).expect("prep failed");
    let (_, body) = rows(&outcome.cleaned);

    // Autauga, Dukes, Cache, and the FIPS-less Bear River region row survive.
    assert_eq!(outcome.summary.rows_read, 9);
    assert_eq!(outcome.summary.rows_written, 4);
    assert_eq!(outcome.summary.rows_dropped, 5);
    assert!(body.iter().any(|row| row[1] == "Bear River"));
    assert!(!body.iter().any(|row| row[2] == "Afghanistan"));

    let rules: Vec<&str> = outcome
        .summary
        .dropped
        .iter()
        .map(|dropped| dropped.rule)
        .collect();
    assert_eq!(
        rules,
        vec![
            "non_us",
            "unassigned",
            "out_of_state",
            "puerto_rico",
            "territory",
        ]
    );
}

#[test]
fn county_prep_pads_fips_and_truncates_dates() {
    let outcome =
        prep_county(&fixture("12-09-2020.csv"), &PrepOptions::default()).expect("prep failed");
    let (_, body) = rows(&outcome.cleaned);

    let autauga = body
        .iter()
        .find(|row| row[1] == "Autauga")
        .expect("Autauga row missing");
    assert_eq!(autauga[0], "01001");
    assert_eq!(autauga[3], "2020-12-10");
    // rate columns rounded to 3 decimals, empty rates become 0
    assert_eq!(autauga[11], "6420.282");
    let bear_river = body
        .iter()
        .find(|row| row[1] == "Bear River")
        .expect("Bear River row missing");
    assert_eq!(bear_river[11], "0");
}

#[test]
fn state_prep_appends_preproc_stamp() {
    let outcome = prep_state(&fixture("12-09-2020_states.csv"), &PrepOptions::default())
        .expect("state prep failed");
    let (header, body) = rows(&outcome.cleaned);

    assert_eq!(header.last().map(String::as_str), Some("preproc_stamp"));
    assert_eq!(header.first().map(String::as_str), Some("State"));

    // Guam, Puerto Rico, Diamond Princess, and the Recovered bucket are gone.
    assert_eq!(outcome.summary.rows_written, 3);
    assert_eq!(outcome.summary.rows_dropped, 4);

    let alabama = body
        .iter()
        .find(|row| row[0] == "Alabama")
        .expect("Alabama row missing");
    // header occupies line 1, Alabama is the first data row
    assert_eq!(alabama.last().map(String::as_str), Some("2"));
}

#[test]
fn header_only_input_is_an_empty_file_error() {
    let header_only = "FIPS,Admin2,Province_State,Country_Region,Last_Update\n";
    let err = prep_county(header_only, &PrepOptions::default()).unwrap_err();
    assert!(matches!(err, PrepError::EmptyFile));
}

#[test]
fn latest_daily_report_prefers_newest_date() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data");
    let latest = latest_daily_report(&dir).expect("no daily report found");
    assert_eq!(
        latest.file_name().and_then(|name| name.to_str()),
        Some("12-09-2020.csv")
    );
}
