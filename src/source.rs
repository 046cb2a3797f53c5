use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use encoding_rs::{UTF_8, WINDOWS_1252};
use tracing::{debug, warn};

use std::{borrow::Cow, fmt::Display, fs, path::Path};

use crate::{
    config::{Columns, Config},
    Error, Result,
};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];
const WORKBOOK_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];

/// A raw value from the export, before any numeric interpretation.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Cell {
    fn from_field(field: &str) -> Self {
        let field = field.trim();
        if field.is_empty() {
            Self::Empty
        } else {
            Self::Text(field.to_string())
        }
    }

    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            Data::Int(n) => Self::Number(*n as f64),
            Data::Float(n) => Self::Number(*n),
            Data::String(s) => Self::from_field(s),
            Data::Bool(b) => Self::Text(b.to_string()),
            Data::DateTime(_) | Data::DateTimeIso(_) => data.as_date().map_or(Self::Empty, Self::Date),
            Data::DurationIso(s) => Self::Text(s.clone()),
            Data::Error(e) => Self::Text(e.to_string()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the cell as display text, or `None` if it is empty.
    ///
    /// Whole numbers lose their fractional part, so a code stored as `1924.0`
    /// reads as `1924`.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(format!("{n:.0}")),
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Date(d) => Some(d.to_string()),
        }
    }

    fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Text(s) => parse_date(s),
            Self::Empty | Self::Number(_) => None,
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// A product code, in its string form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductCode(String);

impl ProductCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_cell(cell: &Cell) -> Option<Self> {
        cell.text().map(|code| Self::from(code.as_str()))
    }
}

impl From<&str> for ProductCode {
    fn from(code: &str) -> Self {
        Self(code.trim().to_string())
    }
}

impl Display for ProductCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

/// One line of the sales export.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub code: ProductCode,
    pub description: String,
    pub date: NaiveDate,
    pub quantity_real: Cell,
    pub quantity: Cell,
    pub net_revenue: Cell,
    pub profit_loss: Cell,
    pub customer: Option<String>,
    pub salesperson: Option<String>,
}

/// Positions of the configured columns in the header.
struct Layout {
    code: usize,
    description: usize,
    date: usize,
    quantity_real: usize,
    net_revenue: usize,
    profit_loss: usize,
    quantity: Option<usize>,
    customer: Option<usize>,
    salesperson: Option<usize>,
}

impl Layout {
    fn new(header: &[String], columns: &Columns) -> Result<Self> {
        let find = |name: &str| header.iter().position(|h| h == name);
        let missing: Vec<String> = columns
            .base()
            .into_iter()
            .filter(|name| find(*name).is_none())
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingColumns(missing));
        }
        let base = |name: &str| find(name).ok_or_else(|| Error::MissingColumns(vec![name.into()]));
        Ok(Self {
            code: base(&columns.code)?,
            description: base(&columns.description)?,
            date: base(&columns.date)?,
            quantity_real: base(&columns.quantity_real)?,
            net_revenue: base(&columns.net_revenue)?,
            profit_loss: base(&columns.profit_loss)?,
            quantity: find(&columns.quantity),
            customer: find(&columns.customer),
            salesperson: find(&columns.salesperson),
        })
    }

    fn transaction(&self, row: &[Cell], line: usize) -> Option<Transaction> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or(Cell::Empty);
        let optional = |i: Option<usize>| i.map_or(Cell::Empty, cell);
        let Some(code) = ProductCode::from_cell(&cell(self.code)) else {
            warn!(line, "skipping row with no product code");
            return None;
        };
        let Some(date) = cell(self.date).date() else {
            warn!(line, %code, value = ?cell(self.date), "skipping row with unreadable date");
            return None;
        };
        Some(Transaction {
            code,
            description: cell(self.description).text().unwrap_or_default(),
            date,
            quantity_real: cell(self.quantity_real),
            quantity: optional(self.quantity),
            net_revenue: cell(self.net_revenue),
            profit_loss: cell(self.profit_loss),
            customer: optional(self.customer).text(),
            salesperson: optional(self.salesperson).text(),
        })
    }
}

/// Holds the transactions loaded from one export.
///
/// To load a CSV file or a workbook, use [`Table::from_path`]. To build a table
/// from cells already in memory, use [`Table::from_grid`].
#[derive(Debug, Default)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Transaction>,
    skipped: usize,
}

impl Table {
    /// Reads the export at `path`, choosing the reader from its extension:
    /// `xlsx`, `xlsm`, `xls` and `ods` files are read as workbooks, anything
    /// else as CSV.
    ///
    /// # Errors
    ///
    /// Returns errors if the file cannot be read, the header row is beyond the
    /// end of the data, or any required column is missing.
    pub fn from_path(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let is_workbook = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| WORKBOOK_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_workbook {
            Self::read_workbook(path, config)
        } else {
            Self::read_csv(path, config)
        }
    }

    /// Reads a CSV export. The header is the record at `config.header_row`
    /// (zero-based); the records before it are ignored.
    ///
    /// The file is read as UTF-8, or as Windows-1252 (which covers Latin-1)
    /// if it is not valid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns any errors from reading or parsing the CSV file, and the errors
    /// of [`Table::from_grid`].
    pub fn read_csv(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let text = decode(&bytes);
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut records = rdr.records();
        let header = records
            .by_ref()
            .nth(config.header_row)
            .ok_or(Error::NoHeader(config.header_row))??;
        let header = header.iter().map(|h| h.trim().to_string()).collect();
        let rows = records
            .map(|record| record.map(|r| r.iter().map(Cell::from_field).collect()))
            .collect::<Result<Vec<Vec<Cell>>, csv::Error>>()?;
        debug!(path = %path.as_ref().display(), rows = rows.len(), "read CSV export");
        Self::from_grid(header, rows, &config.columns, config.header_row)
    }

    /// Reads a workbook export from `config.sheet`, or from the first sheet if
    /// none is configured. The header row is counted from the top of the sheet.
    ///
    /// # Errors
    ///
    /// Returns any errors from opening the workbook or its sheet, and the
    /// errors of [`Table::from_grid`].
    pub fn read_workbook(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let mut workbook = open_workbook_auto(path.as_ref())?;
        let sheet = match &config.sheet {
            Some(sheet) => sheet.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or(calamine::Error::Msg("workbook has no sheets"))?,
        };
        let range = workbook.worksheet_range(&sheet)?;
        let top = range.start().map_or(0, |(row, _)| row as usize);
        let Some(skip) = config.header_row.checked_sub(top) else {
            return Err(Error::NoHeader(config.header_row));
        };
        let mut grid = range.rows();
        let header = grid
            .nth(skip)
            .ok_or(Error::NoHeader(config.header_row))?
            .iter()
            .map(|h| h.to_string().trim().to_string())
            .collect();
        let rows: Vec<Vec<Cell>> = grid.map(|r| r.iter().map(Cell::from_data).collect()).collect();
        debug!(path = %path.as_ref().display(), sheet = %sheet, rows = rows.len(), "read workbook export");
        Self::from_grid(header, rows, &config.columns, config.header_row)
    }

    /// Builds a table from a header and the data rows that follow it.
    ///
    /// `header_row` is only used to report line numbers. Fully empty rows are
    /// ignored; rows without a product code or a readable date are skipped
    /// with a warning and counted in [`Table::skipped`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumns`], naming every one, if any of the
    /// columns every report needs is absent from `header`.
    pub fn from_grid(
        header: Vec<String>,
        rows: impl IntoIterator<Item = Vec<Cell>>,
        columns: &Columns,
        header_row: usize,
    ) -> Result<Self> {
        let layout = Layout::new(&header, columns)?;
        let mut table = Table {
            header,
            ..Default::default()
        };
        for (i, row) in rows.into_iter().enumerate() {
            if row.iter().all(Cell::is_empty) {
                continue;
            }
            // 1-based line in the source, counting the header
            let line = header_row + i + 2;
            match layout.transaction(&row, line) {
                Some(transaction) => table.rows.push(transaction),
                None => table.skipped += 1,
            }
        }
        Ok(table)
    }

    #[must_use]
    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    /// Number of non-empty rows that could not be loaded.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.header.iter().any(|h| h == name)
    }

    /// Checks that every column in `names` is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumns`] listing each absent name.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.has_column(name))
            .map(ToString::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingColumns(missing))
        }
    }
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
    let (text, malformed) = UTF_8.decode_with_bom_removal(bytes);
    if !malformed {
        return text;
    }
    debug!("export is not UTF-8, reading it as Windows-1252");
    WINDOWS_1252.decode_without_bom_handling(bytes).0
}
