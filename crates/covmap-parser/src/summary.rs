use serde::Serialize;

/// One deleted raw row, kept so a prep run can be audited afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct DroppedRow {
    pub line: u64,
    pub rule: &'static str,
    pub raw: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrepSummary {
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_dropped: usize,
    pub dropped: Vec<DroppedRow>,
}
