use serde::Deserialize;

use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use crate::{Metric, Result};

/// Entries per ranking page when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(size) => size,
    None => panic!("page size must be non-zero"),
};

/// Zero-based row holding the column names in the usual margin export.
pub const DEFAULT_HEADER_ROW: usize = 8;

/// Free space, in bytes, the output directory must have before a report is
/// written.
pub const DEFAULT_MIN_FREE_SPACE: u64 = 1 << 30;

/// Names of the export columns the reports read.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Columns {
    pub code: String,
    pub description: String,
    pub date: String,
    pub quantity_real: String,
    pub quantity: String,
    pub net_revenue: String,
    pub profit_loss: String,
    pub customer: String,
    pub salesperson: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            code: "CODPRODUTO".into(),
            description: "DESCRICAO".into(),
            date: "DATA".into(),
            quantity_real: "QTDE REAL".into(),
            quantity: "QTDE".into(),
            net_revenue: "Fat Liquido".into(),
            profit_loss: "Lucro / Prej.".into(),
            customer: "RAZAO".into(),
            salesperson: "VENDEDOR".into(),
        }
    }
}

impl Columns {
    /// The columns every report needs, in header order of the usual export.
    #[must_use]
    pub fn base(&self) -> [&str; 6] {
        [
            &self.code,
            &self.description,
            &self.date,
            &self.quantity_real,
            &self.net_revenue,
            &self.profit_loss,
        ]
    }
}

/// What to do with rows whose real quantity is negative (returns, usually)
/// when ranking by tonnage.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NegativeTonnage {
    /// Aggregate them like any other row.
    #[default]
    Keep,
    /// Leave them out of the tonnage ranking.
    Exclude,
}

/// Settings for one run over an export.
///
/// Every field has a default, so a config file only needs the settings that
/// differ:
///
/// ```toml
/// header_row = 0
/// page_size = 10
/// metrics = ["tonnage", "margin"]
/// groups = "product_groups"
///
/// [columns]
/// net_revenue = "Net Revenue"
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Worksheet to read from a workbook; the first sheet if unset.
    pub sheet: Option<String>,
    pub header_row: usize,
    pub page_size: NonZeroUsize,
    pub metrics: Vec<Metric>,
    pub negative_tonnage: NegativeTonnage,
    /// Groups file, in the format read by [`crate::GroupRegistry::from_file`].
    pub groups: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// See [`DEFAULT_MIN_FREE_SPACE`]; 0 turns the check off.
    pub min_free_space: u64,
    pub columns: Columns,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sheet: None,
            header_row: DEFAULT_HEADER_ROW,
            page_size: DEFAULT_PAGE_SIZE,
            metrics: Metric::ALL.to_vec(),
            negative_tonnage: NegativeTonnage::default(),
            groups: None,
            output_dir: PathBuf::from("."),
            min_free_space: DEFAULT_MIN_FREE_SPACE,
            columns: Columns::default(),
        }
    }
}

impl Config {
    /// Reads a TOML config file from `path`.
    ///
    /// Relative `groups` and `output_dir` paths are resolved against the
    /// directory containing the config file.
    ///
    /// # Errors
    ///
    /// Returns errors if the file cannot be read or is not valid config TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        if let Some(groups) = config.groups.as_mut().filter(|g| g.is_relative()) {
            *groups = base.join(&*groups);
        }
        if config.output_dir.is_relative() {
            config.output_dir = base.join(&config.output_dir);
        }
        Ok(config)
    }
}
