use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("raw file is missing a header row")]
    MissingHeader,

    #[error("raw file contained no data rows")]
    EmptyFile,

    #[error("glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("no daily report files (MM-DD-YYYY.csv) found under {dir}")]
    NoDailyReports { dir: String },
}
