use std::{collections::HashSet, fmt::Display};

use crate::{config::Columns, pipeline::Period, Result, Table};

/// How many different customers, salespeople and products an export covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summary {
    pub period: Option<Period>,
    pub customers: usize,
    pub salespeople: usize,
    pub products: usize,
}

impl Summary {
    /// Counts the distinct non-empty customers, salespeople and product codes
    /// in `table`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingColumns`] if `table` lacks the customer
    /// or salesperson column.
    pub fn build(table: &Table, columns: &Columns) -> Result<Self> {
        table.require(&[columns.customer.as_str(), columns.salesperson.as_str()])?;
        let mut customers = HashSet::new();
        let mut salespeople = HashSet::new();
        let mut products = HashSet::new();
        for row in table.rows() {
            customers.extend(row.customer.as_deref());
            salespeople.extend(row.salesperson.as_deref());
            products.insert(&row.code);
        }
        Ok(Self {
            period: Period::of_table(table),
            customers: customers.len(),
            salespeople: salespeople.len(),
            products: products.len(),
        })
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SALES RANKING - GENERAL")?;
        if let Some(period) = self.period {
            writeln!(f, "{period}")?;
        }
        writeln!(f)?;
        writeln!(f, "{:12} {:>8}", "Indicator", "Count")?;
        writeln!(f, "{:-<21}", "")?;
        writeln!(f, "{:12} {:8}", "Customers", self.customers)?;
        writeln!(f, "{:12} {:8}", "Salespeople", self.salespeople)?;
        writeln!(f, "{:12} {:8}", "Products", self.products)?;
        writeln!(f, "{:-<21}", "")?;
        Ok(())
    }
}
