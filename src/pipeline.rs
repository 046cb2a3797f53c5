use chrono::{Datelike, NaiveDate};
use tracing::info;

use std::{collections::HashMap, fmt::Display, num::NonZeroUsize};

use crate::{
    aggregate::{aggregate, Diagnostics},
    classify::{classify, Identity},
    config::{Config, NegativeTonnage},
    rank::{paginate, rank, Page},
    GroupRegistry, Metric, Table,
};

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// The month a report covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Period {
    /// 1 to 12.
    pub month: u32,
    pub year: i32,
}

impl Period {
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            year: date.year(),
        }
    }

    /// The period of the first row of `table`, if it has any rows.
    #[must_use]
    pub fn of_table(table: &Table) -> Option<Self> {
        table.rows().first().map(|row| Self::of(row.date))
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let month = MONTHS[(self.month as usize).saturating_sub(1) % MONTHS.len()];
        write!(f, "{month} {}", self.year)
    }
}

/// A finished ranking for one metric, ready for rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricReport {
    pub metric: Metric,
    pub period: Option<Period>,
    /// The metric over every row that counted.
    pub total: f64,
    pub pages: Vec<Page>,
    pub diagnostics: Diagnostics,
    weekly: HashMap<Identity, Vec<(NaiveDate, f64)>>,
}

impl MetricReport {
    /// The weekly values of `identity`, oldest week first, keyed by the Monday
    /// of each week.
    #[must_use]
    pub fn series(&self, identity: &Identity) -> &[(NaiveDate, f64)] {
        self.weekly.get(identity).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Turns a loaded table into a ranking for a metric.
///
/// # Examples
///
/// ```
/// # use std::num::NonZeroUsize;
/// # use sales_ranking::{config::Columns, Cell, GroupRegistry, Metric, Pipeline, Table};
/// let header = Columns::default().base().map(String::from).to_vec();
/// let row = |code: &str, kg: f64| {
///     vec![
///         Cell::Text(code.into()),
///         Cell::Text(format!("PRODUCT {code}")),
///         Cell::Text("2025-05-02".into()),
///         Cell::Number(kg),
///         Cell::Number(100.0),
///         Cell::Number(10.0),
///     ]
/// };
/// let table = Table::from_grid(header, [row("1", 2.0), row("2", 5.0)], &Columns::default(), 0)?;
/// let groups = GroupRegistry::new();
/// let report = Pipeline::new(&groups, NonZeroUsize::MIN).run(&table, Metric::Tonnage);
/// assert_eq!(report.total, 7.0);
/// assert_eq!(report.pages.len(), 2);
/// assert_eq!(report.pages[0].entries[0].label, "PRODUCT 2");
/// # Ok::<(), sales_ranking::Error>(())
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Pipeline<'a> {
    groups: &'a GroupRegistry,
    page_size: NonZeroUsize,
    negative_tonnage: NegativeTonnage,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(groups: &'a GroupRegistry, page_size: NonZeroUsize) -> Self {
        Self {
            groups,
            page_size,
            negative_tonnage: NegativeTonnage::default(),
        }
    }

    #[must_use]
    pub fn from_config(groups: &'a GroupRegistry, config: &Config) -> Self {
        Self::new(groups, config.page_size).negative_tonnage(config.negative_tonnage)
    }

    #[must_use]
    pub fn negative_tonnage(mut self, policy: NegativeTonnage) -> Self {
        self.negative_tonnage = policy;
        self
    }

    /// Classifies, aggregates, ranks and paginates every row of `table`.
    #[must_use]
    pub fn run(&self, table: &Table, metric: Metric) -> MetricReport {
        let rows = table.rows().iter().map(|row| classify(row, self.groups));
        let aggregation = aggregate(rows, metric, self.negative_tonnage);
        let mut weekly: HashMap<Identity, Vec<(NaiveDate, f64)>> = HashMap::new();
        for point in aggregation.weekly() {
            weekly
                .entry(point.identity.clone())
                .or_default()
                .push((point.week, point.value));
        }
        let pages = paginate(rank(&aggregation.by_identity, metric), self.page_size);
        info!(
            %metric,
            entries = aggregation.by_identity.len(),
            pages = pages.len(),
            dropped = aggregation.diagnostics.dropped,
            "ranked"
        );
        MetricReport {
            metric,
            period: Period::of_table(table),
            total: aggregation.total(),
            pages,
            diagnostics: aggregation.diagnostics,
            weekly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn sales() -> Table {
        let config = Config {
            header_row: 2,
            ..Config::default()
        };
        Table::read_csv("testdata/sales.csv", &config).unwrap()
    }

    #[test]
    fn period_displays_month_name_and_year() {
        let period = Period::of(NaiveDate::from_ymd_opt(2025, 5, 31).unwrap());
        assert_eq!(period.to_string(), "May 2025");
        assert_eq!(Period { month: 12, year: 2024 }.to_string(), "December 2024");
    }

    #[test]
    fn run_fn_takes_period_from_first_row() {
        let groups = GroupRegistry::new();
        let report = Pipeline::new(&groups, NonZeroUsize::MIN).run(&sales(), Metric::Revenue);
        assert_eq!(report.period, Some(Period { month: 5, year: 2025 }));
        assert_eq!(Pipeline::new(&groups, NonZeroUsize::MIN).run(&Table::default(), Metric::Revenue).period, None);
    }

    #[test]
    fn run_fn_is_deterministic() {
        let groups = GroupRegistry::from_file("testdata/groups").unwrap();
        let table = sales();
        let pipeline = Pipeline::new(&groups, NonZeroUsize::new(2).unwrap());
        for metric in Metric::ALL {
            assert_eq!(pipeline.run(&table, metric), pipeline.run(&table, metric));
        }
    }

    #[test]
    fn series_fn_returns_weekly_values_of_one_identity() {
        let groups = GroupRegistry::from_file("testdata/groups").unwrap();
        let report = Pipeline::new(&groups, NonZeroUsize::MIN).run(&sales(), Metric::Tonnage);
        let acem = report.series(&Identity::Group("ACEM".into()));
        assert!(!acem.is_empty());
        assert!(acem.windows(2).all(|w| w[0].0 < w[1].0));
        let total: f64 = acem.iter().map(|(_, v)| v).sum();
        let entry = report
            .pages
            .iter()
            .flat_map(|p| &p.entries)
            .find(|e| e.identity == Identity::Group("ACEM".into()))
            .unwrap();
        assert!((total - entry.value).abs() < 1e-9);
        assert!(report.series(&Identity::Group("NOBODY".into())).is_empty());
    }
}
