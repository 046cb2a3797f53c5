use serde_with::DeserializeFromStr;

use std::{fmt::Display, ops::AddAssign, str::FromStr};

use crate::{
    money::{format_decimal, format_percent, parse_amount, parse_quantity, Money},
    source::{Cell, Transaction},
    Error, Result,
};

/// The quantity a report ranks by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, DeserializeFromStr)]
pub enum Metric {
    /// Total real quantity (weight), in kilograms.
    Tonnage,
    /// Total net revenue.
    Revenue,
    /// Profit as a percentage of net revenue.
    Margin,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Self::Tonnage, Self::Revenue, Self::Margin];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Tonnage => "Tonnage",
            Self::Revenue => "Revenue",
            Self::Margin => "Margin",
        }
    }

    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            Self::Tonnage => "kg",
            Self::Revenue => "R$",
            Self::Margin => "%",
        }
    }

    /// The fields a row must have for it to count towards this metric.
    #[must_use]
    pub fn fields(self) -> &'static [Field] {
        match self {
            Self::Tonnage => &[Field::QuantityReal],
            Self::Revenue => &[Field::NetRevenue],
            Self::Margin => &[Field::NetRevenue, Field::ProfitLoss],
        }
    }

    /// Reads this metric from `totals`.
    ///
    /// Margin is never summed: it is always the ratio of the summed profit to
    /// the summed revenue, so it composes correctly at every level.
    #[must_use]
    pub fn value(self, totals: &Totals) -> f64 {
        match self {
            Self::Tonnage => totals.tonnage,
            Self::Revenue => totals.revenue.amount(),
            Self::Margin => totals.margin(),
        }
    }

    /// Formats `value` for display, as in `1.234,500`, `R$1.234,50` or `12,34%`.
    #[must_use]
    pub fn format(self, value: f64) -> String {
        match self {
            Self::Tonnage => format_decimal(value, 3),
            Self::Revenue => Money::new(value).to_string(),
            Self::Margin => format_percent(value),
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tonnage" | "weight" | "tonelagem" => Ok(Self::Tonnage),
            "revenue" | "faturamento" => Ok(Self::Revenue),
            "margin" | "margem" => Ok(Self::Margin),
            _ => Err(Error::UnknownMetric(s.to_string())),
        }
    }
}

/// A numeric column of the export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    QuantityReal,
    Quantity,
    NetRevenue,
    ProfitLoss,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Self::QuantityReal,
        Self::Quantity,
        Self::NetRevenue,
        Self::ProfitLoss,
    ];

    #[must_use]
    pub fn cell(self, row: &Transaction) -> &Cell {
        match self {
            Self::QuantityReal => &row.quantity_real,
            Self::Quantity => &row.quantity,
            Self::NetRevenue => &row.net_revenue,
            Self::ProfitLoss => &row.profit_loss,
        }
    }

    /// Reads this field of `row`: quantities as weights, the rest as money.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnparseableAmount`] if the cell holds no number.
    pub fn parse(self, row: &Transaction) -> Result<Option<f64>> {
        let cell = self.cell(row);
        match self {
            Self::QuantityReal | Self::Quantity => parse_quantity(cell),
            Self::NetRevenue | Self::ProfitLoss => parse_amount(cell),
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::QuantityReal => "real quantity",
            Self::Quantity => "quantity",
            Self::NetRevenue => "net revenue",
            Self::ProfitLoss => "profit/loss",
        })
    }
}

/// The parsed numeric fields of one row. Fields a run did not ask for are 0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Measures {
    pub tonnage: f64,
    pub quantity: f64,
    pub revenue: f64,
    pub profit: f64,
}

impl Measures {
    pub fn set(&mut self, field: Field, value: f64) {
        match field {
            Field::QuantityReal => self.tonnage = value,
            Field::Quantity => self.quantity = value,
            Field::NetRevenue => self.revenue = value,
            Field::ProfitLoss => self.profit = value,
        }
    }
}

/// Running sums over a set of rows.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Totals {
    pub tonnage: f64,
    pub quantity: f64,
    pub revenue: Money,
    pub profit: Money,
    /// Number of rows summed.
    pub count: usize,
}

impl Totals {
    #[must_use]
    pub fn margin(&self) -> f64 {
        margin(self.profit.amount(), self.revenue.amount())
    }
}

impl AddAssign<Measures> for Totals {
    fn add_assign(&mut self, rhs: Measures) {
        self.tonnage += rhs.tonnage;
        self.quantity += rhs.quantity;
        self.revenue += Money::new(rhs.revenue);
        self.profit += Money::new(rhs.profit);
        self.count += 1;
    }
}

/// Returns `profit` as a percentage of `revenue`, or 0 if `revenue` is not
/// positive.
///
/// ```
/// # use sales_ranking::metric::margin;
/// assert_eq!(margin(25.0, 250.0), 10.0);
/// assert_eq!(margin(25.0, -250.0), 0.0);
/// ```
#[must_use]
pub fn margin(profit: f64, revenue: f64) -> f64 {
    if revenue <= 0.0 {
        0.0
    } else {
        profit / revenue * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measures(revenue: f64, profit: f64) -> Measures {
        Measures {
            revenue,
            profit,
            ..Measures::default()
        }
    }

    #[test]
    fn margin_is_ratio_of_sums_not_average_of_ratios() {
        let mut totals = Totals::default();
        for (revenue, profit) in [(100.0, 10.0), (-50.0, -5.0), (200.0, 20.0)] {
            totals += measures(revenue, profit);
        }
        assert_eq!(totals.count, 3);
        assert_eq!(Metric::Margin.value(&totals), 10.0);
    }

    #[test]
    fn margin_is_zero_when_summed_revenue_is_not_positive() {
        let mut totals = Totals::default();
        totals += measures(100.0, 40.0);
        totals += measures(-100.0, 30.0);
        assert_eq!(totals.margin(), 0.0);
        totals += measures(-1.0, 5.0);
        assert_eq!(totals.margin(), 0.0);
    }

    #[test]
    fn value_fn_reads_the_matching_total() {
        let mut totals = Totals::default();
        totals += Measures {
            tonnage: 12.5,
            quantity: 5.0,
            revenue: 300.0,
            profit: 30.0,
        };
        assert_eq!(Metric::Tonnage.value(&totals), 12.5);
        assert_eq!(Metric::Revenue.value(&totals), 300.0);
        assert_eq!(Metric::Margin.value(&totals), 10.0);
    }

    #[test]
    fn metric_parses_english_and_portuguese_names() {
        assert_eq!("Tonnage".parse::<Metric>().unwrap(), Metric::Tonnage);
        assert_eq!("faturamento".parse::<Metric>().unwrap(), Metric::Revenue);
        assert_eq!(" MARGEM ".parse::<Metric>().unwrap(), Metric::Margin);
        assert!(matches!(
            "profit".parse::<Metric>(),
            Err(Error::UnknownMetric(name)) if name == "profit"
        ));
    }

    #[test]
    fn format_fn_uses_the_metric_unit() {
        assert_eq!(Metric::Tonnage.format(1234.5), "1.234,500");
        assert_eq!(Metric::Revenue.format(-99.9), "-R$99,90");
        assert_eq!(Metric::Margin.format(7.0), "7,00%");
    }
}
