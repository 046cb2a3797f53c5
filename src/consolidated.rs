use chrono::NaiveDate;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet};
use tracing::info;

use std::{io::Write, path::Path};

use crate::{
    aggregate::{measure, Diagnostics, Ledger},
    classify::{classify, Identity},
    config::Columns,
    metric::Field,
    money::Money,
    output::write_atomically,
    pipeline::Period,
    GroupRegistry, Result, Table,
};

pub const SHEET_NAME: &str = "Consolidated";

/// Zero-based row of the column headers.
const HEADER_ROW: u32 = 2;

const HEADERS: [(&str, f64); 8] = [
    ("Code", 10.0),
    ("Description", 40.0),
    ("Avg. weight (kg)", 16.0),
    ("Tonnage (kg)", 16.0),
    ("Revenue", 18.0),
    ("Margin", 10.0),
    ("Profit", 18.0),
    ("Sales", 10.0),
];

/// The consolidated figures of one group or ungrouped product.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsolidatedRow {
    pub identity: Identity,
    pub description: String,
    /// Kilograms per unit sold; 0 if no units were sold.
    pub average_weight: f64,
    pub tonnage: f64,
    pub units: f64,
    pub revenue: Money,
    /// Profit over revenue, as a fraction.
    pub margin: f64,
    pub profit: Money,
    pub count: usize,
}

impl ConsolidatedRow {
    /// `GROUP` for a group, otherwise the product code.
    #[must_use]
    pub fn code(&self) -> &str {
        self.identity.kind()
    }
}

/// Every group and ungrouped product with all its figures, by tonnage.
#[derive(Debug)]
pub struct Consolidated {
    pub period: Option<Period>,
    pub rows: Vec<ConsolidatedRow>,
    pub diagnostics: Diagnostics,
}

impl Consolidated {
    /// Consolidates `table`.
    ///
    /// Rows missing any of the real quantity, quantity, net revenue or
    /// profit/loss values are left out. Products are described by their most
    /// recent description.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingColumns`] if `table` has no quantity
    /// column.
    pub fn build(table: &Table, groups: &GroupRegistry, columns: &Columns) -> Result<Self> {
        table.require(&[columns.quantity.as_str()])?;
        let mut diagnostics = Diagnostics::default();
        let mut ledger = Ledger::default();
        let mut latest: Vec<(NaiveDate, String)> = Vec::new();
        for row in table.rows() {
            let Some(measures) = measure(row, &Field::ALL, &mut diagnostics) else {
                continue;
            };
            let classified = classify(row, groups);
            let slot = ledger.add(&classified, measures);
            if slot == latest.len() {
                latest.push((row.date, classified.label.to_string()));
            } else if row.date >= latest[slot].0 {
                latest[slot] = (row.date, classified.label.to_string());
            }
        }
        let mut rows: Vec<ConsolidatedRow> = ledger
            .into_entries()
            .into_iter()
            .zip(latest)
            .map(|(entry, (_, description))| {
                let t = entry.totals;
                ConsolidatedRow {
                    identity: entry.identity,
                    description: description.to_uppercase(),
                    average_weight: if t.quantity > 0.0 { t.tonnage / t.quantity } else { 0.0 },
                    tonnage: t.tonnage,
                    units: t.quantity,
                    revenue: t.revenue,
                    margin: t.margin() / 100.0,
                    profit: t.profit,
                    count: t.count,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.tonnage.total_cmp(&a.tonnage));
        info!(rows = rows.len(), dropped = diagnostics.dropped, "consolidated");
        Ok(Self {
            period: Period::of_table(table),
            rows,
            diagnostics,
        })
    }

    /// Lays the rows out in a workbook with a single sheet, [`SHEET_NAME`].
    ///
    /// # Errors
    ///
    /// Returns any error from building the worksheet.
    pub fn to_workbook(&self) -> Result<Workbook> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        self.fill(sheet)?;
        Ok(workbook)
    }

    fn fill(&self, sheet: &mut Worksheet) -> Result<()> {
        let title = Format::new().set_bold().set_font_size(14);
        let header = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::Black)
            .set_align(FormatAlign::Center);
        let weight = Format::new().set_num_format("#,##0.000");
        let money = Format::new().set_num_format("R$ #,##0.00");
        let percent = Format::new().set_num_format("0.00%");
        let count = Format::new().set_num_format("#,##0");

        let heading = match self.period {
            Some(period) => format!("Consolidated Sales - {period}"),
            None => "Consolidated Sales".to_string(),
        };
        sheet.write_string_with_format(0, 0, heading, &title)?;
        for (col, (name, width)) in (0u16..).zip(HEADERS) {
            sheet.write_string_with_format(HEADER_ROW, col, name, &header)?;
            sheet.set_column_width(col, width)?;
        }
        for (r, row) in (HEADER_ROW + 1..).zip(&self.rows) {
            sheet.write_string(r, 0, row.code())?;
            sheet.write_string(r, 1, &row.description)?;
            sheet.write_number_with_format(r, 2, row.average_weight, &weight)?;
            sheet.write_number_with_format(r, 3, row.tonnage, &weight)?;
            sheet.write_number_with_format(r, 4, row.revenue.amount(), &money)?;
            sheet.write_number_with_format(r, 5, row.margin, &percent)?;
            sheet.write_number_with_format(r, 6, row.profit.amount(), &money)?;
            #[allow(clippy::cast_precision_loss)]
            let sales = row.count as f64;
            sheet.write_number_with_format(r, 7, sales, &count)?;
        }
        sheet.set_freeze_panes(HEADER_ROW + 1, 0)?;
        sheet.set_landscape();
        Ok(())
    }

    /// Writes the workbook to `path`, replacing any earlier version.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Consolidated::to_workbook`] or
    /// [`write_atomically`].
    pub fn write_xlsx(&self, path: &Path) -> Result<()> {
        let mut workbook = self.to_workbook()?;
        write_atomically(path, |file| {
            workbook.save_to_writer(&mut *file)?;
            file.flush()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{source::ProductCode, Cell, Config, Error};

    fn header() -> Vec<String> {
        let columns = Columns::default();
        let mut header: Vec<String> = columns.base().map(String::from).to_vec();
        header.push(columns.quantity);
        header
    }

    fn row(code: &str, desc: &str, day: u32, kg: f64, units: Cell, revenue: f64, profit: f64) -> Vec<Cell> {
        vec![
            Cell::Text(code.into()),
            Cell::Text(desc.into()),
            Cell::Date(NaiveDate::from_ymd_opt(2025, 5, day).unwrap()),
            Cell::Number(kg),
            Cell::Number(revenue),
            Cell::Number(profit),
            units,
        ]
    }

    fn table(rows: Vec<Vec<Cell>>) -> Table {
        Table::from_grid(header(), rows, &Columns::default(), 0).unwrap()
    }

    #[test]
    fn build_fn_consolidates_groups_and_products_by_tonnage() {
        let mut groups = GroupRegistry::new();
        groups.add_group("ACEM", ["1924", "8006"]);
        let table = table(vec![
            row("1830", "coracao", 9, 3.0, Cell::Number(2.0), 100.0, 10.0),
            row("1830", "coração de alcatra", 2, 1.0, Cell::Number(1.0), 50.0, 5.0),
            row("1924", "acem resfriado", 2, 4.0, Cell::Number(2.0), 200.0, 30.0),
            row("8006", "acem congelado", 3, 6.0, Cell::Number(3.0), 300.0, 20.0),
            row("8006", "acem congelado", 4, 1.0, Cell::Empty, 10.0, 1.0),
        ]);
        let consolidated = Consolidated::build(&table, &groups, &Columns::default()).unwrap();
        assert_eq!(consolidated.diagnostics.dropped, 1);
        let [acem, heart] = consolidated.rows.as_slice() else {
            panic!("wrong rows: {:?}", consolidated.rows);
        };
        assert_eq!(acem.code(), "GROUP");
        assert_eq!(acem.description, "ACEM");
        assert_eq!(acem.tonnage, 10.0);
        assert_eq!(acem.average_weight, 2.0);
        assert_eq!(acem.margin, 0.1);
        assert_eq!(acem.count, 2);

        assert_eq!(heart.identity, Identity::Product(ProductCode::from("1830")));
        assert_eq!(heart.description, "CORACAO");
        assert_eq!(heart.revenue, Money::new(150.0));
        assert_eq!(heart.units, 3.0);
    }

    #[test]
    fn build_fn_reports_zero_average_weight_without_units() {
        let table = table(vec![row("1", "x", 2, 5.0, Cell::Number(0.0), 10.0, 1.0)]);
        let consolidated = Consolidated::build(&table, &GroupRegistry::new(), &Columns::default()).unwrap();
        assert_eq!(consolidated.rows[0].average_weight, 0.0);
    }

    #[test]
    fn build_fn_requires_the_quantity_column() {
        let config = Config {
            header_row: 0,
            ..Config::default()
        };
        let header: Vec<String> = config.columns.base().map(String::from).to_vec();
        let table = Table::from_grid(header, Vec::new(), &config.columns, 0).unwrap();
        let err = Consolidated::build(&table, &GroupRegistry::new(), &config.columns).unwrap_err();
        assert!(matches!(err, Error::MissingColumns(m) if m == ["QTDE"]));
    }

    #[test]
    fn write_xlsx_fn_writes_a_workbook_calamine_can_read() {
        use calamine::{open_workbook_auto, Data, Reader};

        let table = table(vec![
            row("1", "first", 2, 5.0, Cell::Number(5.0), 10.0, 1.0),
            row("2", "second", 2, 7.0, Cell::Number(1.0), 20.0, 1.0),
        ]);
        let consolidated = Consolidated::build(&table, &GroupRegistry::new(), &Columns::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consolidated.xlsx");
        consolidated.write_xlsx(&path).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), [SHEET_NAME]);
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        assert_eq!(range.get_value((2, 0)), Some(&Data::String("Code".into())));
        assert_eq!(range.get_value((3, 0)), Some(&Data::String("2".into())));
        assert_eq!(range.get_value((3, 3)), Some(&Data::Float(7.0)));
        assert_eq!(range.get_value((4, 1)), Some(&Data::String("FIRST".into())));
    }
}
