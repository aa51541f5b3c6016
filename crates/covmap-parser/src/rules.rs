use once_cell::sync::Lazy;
use regex::Regex;

static FOUR_DIGIT_FIPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").unwrap());
static FIVE_DIGIT_FIPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").unwrap());
static TWO_DIGIT_FIPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}$").unwrap());
static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());

/// State-level FIPS codes for the non-state territories (Puerto Rico has its
/// own rule because it appears at both levels).
const TERRITORY_STATE_FIPS: &[&str] = &["60", "66", "69", "78"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLevel {
    County,
    State,
}

/// Row-deletion rules applied to raw report rows. These replace the grep
/// patterns previously run by hand against the raw files; they match on the
/// parsed FIPS and name fields rather than the joined row text, so quoted
/// commas inside county names cannot shift a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    /// No FIPS and no county name: a non-U.S. entry.
    NonUs,
    /// 5-digit FIPS starting with 9 ("Unassigned" buckets, e.g. 90001).
    Unassigned,
    /// 5-digit FIPS starting with 8 ("Out of <state>" buckets, e.g. 80001).
    OutOfState,
    /// Puerto Rico: county FIPS 72xxx, state FIPS 72.
    PuertoRico,
    /// Territories: a bare state-level FIPS inside a county file, or the
    /// Guam / USVI / N. Marianas / American Samoa codes in a state file.
    Territory,
}

impl RowFilter {
    pub const ALL: [RowFilter; 5] = [
        RowFilter::NonUs,
        RowFilter::Unassigned,
        RowFilter::OutOfState,
        RowFilter::PuertoRico,
        RowFilter::Territory,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            RowFilter::NonUs => "non_us",
            RowFilter::Unassigned => "unassigned",
            RowFilter::OutOfState => "out_of_state",
            RowFilter::PuertoRico => "puerto_rico",
            RowFilter::Territory => "territory",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|rule| rule.key() == key.trim())
    }

    pub fn matches(&self, level: FileLevel, fips: &str, name: &str) -> bool {
        let fips = fips.trim();
        match self {
            RowFilter::NonUs => match level {
                FileLevel::County => fips.is_empty() && name.trim().is_empty(),
                FileLevel::State => fips.is_empty(),
            },
            RowFilter::Unassigned => {
                FIVE_DIGIT_FIPS.is_match(fips) && fips.starts_with('9')
            }
            RowFilter::OutOfState => {
                FIVE_DIGIT_FIPS.is_match(fips) && fips.starts_with('8')
            }
            RowFilter::PuertoRico => match level {
                FileLevel::County => FIVE_DIGIT_FIPS.is_match(fips) && fips.starts_with("72"),
                FileLevel::State => fips == "72",
            },
            RowFilter::Territory => match level {
                FileLevel::County => TWO_DIGIT_FIPS.is_match(fips),
                FileLevel::State => TERRITORY_STATE_FIPS.contains(&fips),
            },
        }
    }
}

/// In-place value rewrites applied before the row filters run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMod {
    /// Left-pad a 4-digit FIPS with a zero (state prefixes below 10 lose
    /// their leading zero in some source extracts).
    PadFips,
    /// Truncate date-time cells to the YYYY-MM-DD prefix.
    DateOnly,
    /// Round the incident-rate / case-fatality-ratio cells to 3 decimals;
    /// empty cells become 0.
    RoundRates,
}

impl FieldMod {
    pub const ALL: [FieldMod; 3] = [FieldMod::PadFips, FieldMod::DateOnly, FieldMod::RoundRates];

    pub fn pad_fips(cell: &str) -> Option<String> {
        let trimmed = cell.trim();
        if FOUR_DIGIT_FIPS.is_match(trimmed) {
            Some(format!("0{trimmed}"))
        } else {
            None
        }
    }

    pub fn date_only(cell: &str) -> Option<String> {
        let found = DATE_PREFIX.find(cell)?;
        if found.as_str() == cell {
            return None;
        }
        Some(found.as_str().to_string())
    }

    pub fn round_rate(cell: &str) -> String {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return "0".to_string();
        }
        match trimmed.parse::<f64>() {
            Ok(value) => format!("{value:.3}"),
            Err(_) => cell.to_string(),
        }
    }
}

#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn territory_rule_is_level_aware() {
        assert!(RowFilter::Territory.matches(FileLevel::County, "66", "Guam"));
        assert!(RowFilter::Territory.matches(FileLevel::State, "66", "Guam"));
        assert!(!RowFilter::Territory.matches(FileLevel::State, "25", "Massachusetts"));
    }

    #[test]
    fn puerto_rico_rule_handles_both_levels() {
        assert!(RowFilter::PuertoRico.matches(FileLevel::County, "72001", "Adjuntas"));
        assert!(RowFilter::PuertoRico.matches(FileLevel::State, "72", "Puerto Rico"));
        assert!(!RowFilter::PuertoRico.matches(FileLevel::County, "25007", "Dukes"));
    }

    #[test]
    fn pad_fips_only_touches_four_digit_codes() {
        assert_eq!(FieldMod::pad_fips("1001"), Some("01001".to_string()));
        assert_eq!(FieldMod::pad_fips("25007"), None);
        assert_eq!(FieldMod::pad_fips(""), None);
    }

    #[test]
    fn date_only_strips_time_suffix() {
        assert_eq!(
            FieldMod::date_only("2020-12-10 05:30:00"),
            Some("2020-12-10".to_string())
        );
        assert_eq!(FieldMod::date_only("2020-12-10"), None);
        assert_eq!(FieldMod::date_only("Autauga"), None);
    }

    #[test]
    fn round_rate_defaults_empty_cells_to_zero() {
        assert_eq!(FieldMod::round_rate(""), "0");
        assert_eq!(FieldMod::round_rate("2.5987665"), "2.599");
        assert_eq!(FieldMod::round_rate("bogus"), "bogus");
    }
}
