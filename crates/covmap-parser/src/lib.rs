pub mod errors;
pub mod prep;
pub mod rules;
pub mod summary;

pub use errors::PrepError;
pub use prep::{
    latest_daily_report, prep_county, prep_county_file, prep_state, prep_state_file, PrepOptions,
    PrepOutcome,
};
pub use rules::{FieldMod, FileLevel, RowFilter};
pub use summary::{DroppedRow, PrepSummary};

#[cfg(test)]
mod tests;
