use covmap_core::error::PipelineError;
use covmap_core::regions::RegionTable;
use covmap_core::tables::{
    load_county_cases_from_csv, load_nyt_series_from_csv, load_state_cases_from_csv,
    CountyPopulation, StatePopulation,
};

const REGION_CSV: &str = "\
UID,Region,stFIPS,Lat,Long,Long_Name,Pop,fips0,fips1,fips2,fips3,fips4,fips5
84070015,Bear River,49,41.52107759,-113.0832583,Bear River Region UT,186818,49003,49033,49005,,,
";

const COUNTY_POP_CSV: &str = "\
FIPS,County,State,Pop
01001,Autauga,Alabama,55869
25007,Dukes,Massachusetts,17332
49003,Box Elder,Utah,56046
49005,Cache,Utah,128289
49033,Rich,Utah,2483
49053,Washington,Utah,177556
";

const STATE_POP_CSV: &str = "\
State,fips,pop,Abbrev
Alabama,1,4903185,AL
Massachusetts,25,6892503,MA
Utah,49,3205958,UT
";

const CLEANED_COUNTY_CSV: &str = "\
FIPS,County,State,Last_Update,Lat,Long_,Confirmed,Deaths,Recovered,Active,Combined_Key,Incident_Rate,Case_Fatality_Ratio
01001,Autauga,Alabama,2020-12-10,32.53952745,-86.64408227,3587,46,0,3541,\"Autauga, Alabama, US\",6420.282,1.282
49053,Washington,Utah,2020-12-10,37.28,-113.50,17755,88,0,17667,\"Washington, Utah, US\",9999.988,0.496
,Bear River,Utah,2020-12-10,,,11724,49,0,11675,\"Bear River, Utah, US\",0,0.418
,Unknown Region,Utah,2020-12-10,,,5,0,0,5,\"Unknown, Utah, US\",0,0
";

const CLEANED_STATE_CSV: &str = "\
State,Last_Update,Lat,Long_,Confirmed,Deaths,Recovered,Active,FIPS,Incident_Rate,Case_Fatality_Ratio,preproc_stamp
Alabama,2020-12-10,32.3182,-86.9023,284922,3831,168387,112704,1,5810.735,1.345,2
Massachusetts,2020-12-10,42.2302,-71.5301,256844,11125,180441,65278,25,3726.392,4.331,3
Utah,2020-12-10,40.15,-111.8624,222545,1003,131417,90125,49,6941.272,0.451,4
";

fn regions() -> RegionTable {
    let mut table = RegionTable::from_csv(REGION_CSV).expect("region csv parses");
    table.rollups.push(RegionTable::builtin_dukes_nantucket());
    table
}

#[test]
fn county_population_excludes_rollup_members() {
    let pop = CountyPopulation::from_csv(COUNTY_POP_CSV, &regions()).expect("pop loads");

    // the three Bear River members are excluded, Dukes (builtin member) too
    assert_eq!(pop.len(), 2);
    assert_eq!(pop.get("01001"), Some(55869));
    assert_eq!(pop.get("49053"), Some(177556));
    assert_eq!(pop.get("49005"), None);
    assert_eq!(pop.get("25007"), None);
}

#[test]
fn duplicate_population_fips_is_rejected() {
    let duplicated = "FIPS,Pop\n01001,10\n01001,20\n";
    let err = CountyPopulation::from_csv(duplicated, &RegionTable::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[test]
fn county_cases_join_regions_population_and_ratios() {
    let regions = regions();
    let pop = CountyPopulation::from_csv(COUNTY_POP_CSV, &regions).expect("pop loads");
    let df = load_county_cases_from_csv(CLEANED_COUNTY_CSV, &regions, &pop).expect("county loads");

    // the fips-less non-region row is dropped, the region row survives
    assert_eq!(df.height(), 3);

    let fips = df.column("fips").unwrap().str().unwrap();
    // sorted by fips: 01001 < 49003 (Bear River synthetic) < 49053
    assert_eq!(fips.get(0), Some("01001"));
    assert_eq!(fips.get(1), Some("49003"));
    assert_eq!(fips.get(2), Some("49053"));

    let pop_col = df.column("pop").unwrap().i64().unwrap();
    assert_eq!(pop_col.get(0), Some(55869));
    // region population comes from the rollup, not the county table
    assert_eq!(pop_col.get(1), Some(186818));
    assert_eq!(pop_col.get(2), Some(177556));

    let cases_to_pop = df.column("cases_to_pop").unwrap().f64().unwrap();
    let deaths_to_pop = df.column("deaths_to_pop").unwrap().f64().unwrap();
    let expected = 100.0 * 3587.0 / 55869.0;
    assert!((cases_to_pop.get(0).unwrap() - expected).abs() < 1e-9);
    let expected = 100.0 * 49.0 / 186818.0;
    assert!((deaths_to_pop.get(1).unwrap() - expected).abs() < 1e-9);
}

#[test]
fn duplicate_county_fips_is_rejected() {
    let duplicated = "\
FIPS,County,State,Last_Update,Lat,Long_,Confirmed,Deaths,Active,Combined_Key,Case_Fatality_Ratio
01001,Autauga,Alabama,2020-12-10,32.5,-86.6,1,0,1,\"Autauga, Alabama, US\",0
01001,Autauga,Alabama,2020-12-10,32.5,-86.6,2,0,2,\"Autauga, Alabama, US\",0
";
    let err = load_county_cases_from_csv(
        duplicated,
        &RegionTable::default(),
        &CountyPopulation::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[test]
fn state_cases_join_population_and_fatality_rate() {
    let pop = StatePopulation::from_csv(STATE_POP_CSV).expect("state pop loads");
    let df = load_state_cases_from_csv(CLEANED_STATE_CSV, &pop).expect("state loads");

    assert_eq!(df.height(), 3);

    let fips = df.column("fips").unwrap().str().unwrap();
    assert_eq!(fips.get(0), Some("01"));

    let abbrev = df.column("abbrev").unwrap().str().unwrap();
    assert_eq!(abbrev.get(0), Some("AL"));

    let rate = df.column("fatality_rate").unwrap().f64().unwrap();
    // 100 * 3831 / 4903185 = 0.07813..., rounded to 2 decimals
    assert_eq!(rate.get(0), Some(0.08));
    // 100 * 11125 / 6892503 = 0.1614...
    assert_eq!(rate.get(1), Some(0.16));
}

#[test]
fn nyt_series_pads_fips_and_rejects_duplicate_keys() {
    let series = "\
date,county,state,fips,cases,deaths
2020-12-09,Autauga,Alabama,1001,3587,46
2020-12-09,Dukes,Massachusetts,25007,312,1
2020-12-08,Autauga,Alabama,1001,3550,45
";
    let df = load_nyt_series_from_csv(series).expect("nyt loads");
    assert_eq!(df.height(), 3);
    let fips = df.column("fips").unwrap().str().unwrap();
    assert_eq!(fips.get(0), Some("01001"));

    let duplicated = "\
date,county,state,fips,cases,deaths
2020-12-09,Autauga,Alabama,01001,3587,46
2020-12-09,Autauga,Alabama,01001,3587,46
";
    let err = load_nyt_series_from_csv(duplicated).unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[test]
fn nyt_rows_without_fips_are_dropped() {
    let series = "\
date,county,state,fips,cases,deaths
2020-12-09,Autauga,Alabama,01001,3587,46
2020-12-09,Unknown,Rhode Island,,100,2
";
    let df = load_nyt_series_from_csv(series).expect("nyt loads");
    assert_eq!(df.height(), 1);
}
