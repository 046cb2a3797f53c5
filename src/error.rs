use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Everything that can go wrong while loading, ranking or writing a report.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("no header found at row {0}: the input has fewer rows")]
    NoHeader(usize),

    #[error("{}: line {line}: {reason}", .path.display())]
    BadGroupLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("could not parse numeric value {0:?}")]
    UnparseableAmount(String),

    #[error("unknown metric {0:?} (expected tonnage, revenue or margin)")]
    UnknownMetric(String),

    #[error("{} is in use by another process; close it and try again", .0.display())]
    Locked(PathBuf),

    #[error("not enough space to write to {}: {free} bytes free, {needed} needed", .path.display())]
    InsufficientSpace { path: PathBuf, needed: u64, free: u64 },

    #[error("reading CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("reading workbook: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("writing workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("parsing config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("rendering report: {0}")]
    Render(#[from] fmt::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
