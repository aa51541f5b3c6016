use polars::prelude::*;

use covmap_core::error::PipelineError;
use covmap_core::regions::{assign_regions, RegionTable};

const REGION_CSV: &str = "\
UID,Region,stFIPS,Lat,Long,Long_Name,Pop,fips0,fips1,fips2,fips3,fips4,fips5,name0,name1,name2,name3,name4,name5,pop0,pop1,pop2,pop3,pop4,pop5
84070015,Bear River,49,41.52107759,-113.0832583,Bear River Region UT,186818,49003,49033,49005,,,,Box Elder,Rich,Cache,,,,56046,2483,128289,,,
84070020,Weber-Morgan,49,41.27116049,-111.9149063,Weber-Morgan Region UT,272337,49057,49029,,,,,Weber,Morgan,,,,,260213,12124,,,,
";

fn table_with_builtin() -> RegionTable {
    let mut table = RegionTable::from_csv(REGION_CSV).expect("region csv parses");
    table.rollups.push(RegionTable::builtin_dukes_nantucket());
    table
}

fn county_frame() -> DataFrame {
    df!(
        "fips" => &[Some("49053"), None, None, None],
        "county" => &[Some("Washington"), Some("Bear River"), Some("Bear River"), Some("Dukes and Nantucket")],
        "state" => &[Some("Utah"), Some("Utah"), Some("Idaho"), Some("Massachusetts")],
        "lat" => &[Some(37.28), None, None, None],
        "long" => &[Some(-113.50), None, None, None],
        "long_name" => &[Some("Washington, Utah, US"), Some("Bear River, Utah, US"), None, Some("Dukes and Nantucket, Massachusetts, US")],
    )
    .unwrap()
}

#[test]
fn member_slots_stop_at_first_empty() {
    let table = RegionTable::from_csv(REGION_CSV).expect("region csv parses");

    let bear_river = &table.rollups[0];
    assert_eq!(bear_river.member_fips, vec!["49003", "49033", "49005"]);
    assert_eq!(bear_river.synthetic_fips(), "49003");
    assert_eq!(bear_river.pop, 186818);

    let weber = &table.rollups[1];
    assert_eq!(weber.member_fips.len(), 2);
    assert_eq!(weber.member_pops, vec![260213, 12124]);
}

#[test]
fn single_member_region_is_rejected() {
    let bad = "\
UID,Region,stFIPS,Lat,Long,Long_Name,Pop,fips0,fips1
1,Lonely,49,0.0,0.0,Lonely Region,10,49001,
";
    let err = RegionTable::from_csv(bad).unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[test]
fn member_fips_spans_all_rollups() {
    let table = table_with_builtin();
    let members = table.member_fips();
    assert!(members.contains("49005"));
    assert!(members.contains("25019"));
    assert_eq!(members.len(), 7);
}

#[test]
fn assign_regions_fills_fipsless_rollup_rows() {
    let table = table_with_builtin();
    let assigned = assign_regions(&county_frame(), &table).expect("assignment succeeded");

    let fips = assigned.column("fips").unwrap().str().unwrap();
    let pop = assigned.column("pop").unwrap().i64().unwrap();
    let members = assigned.column("member_fips").unwrap().str().unwrap();
    let long_name = assigned.column("long_name").unwrap().str().unwrap();

    // ordinary county untouched, no rollup population
    assert_eq!(fips.get(0), Some("49053"));
    assert_eq!(pop.get(0), None);
    assert_eq!(members.get(0), None);

    // Utah rollup filled with synthetic fips and aggregate population
    assert_eq!(fips.get(1), Some("49003"));
    assert_eq!(pop.get(1), Some(186818));
    assert_eq!(members.get(1), Some("49003|49033|49005"));
    assert_eq!(long_name.get(1), Some("Bear River Region UT"));

    // same region name in the wrong state stays unassigned
    assert_eq!(fips.get(2), None);
    assert_eq!(pop.get(2), None);

    // built-in Massachusetts rollup
    assert_eq!(fips.get(3), Some("25007"));
    assert_eq!(pop.get(3), Some(28731));
    assert_eq!(members.get(3), Some("25007|25019"));
}
