use regex::Regex;

use std::{
    fmt::{Debug, Display},
    iter::Sum,
    ops::AddAssign,
    str::FromStr,
    sync::LazyLock,
};

use crate::{source::Cell, Error, Result};

const CURRENCY_SYMBOL: &str = "R$";

static NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9,.\-]").expect("noise pattern is valid"));

/// Represents an amount of money in Brazilian reais.
///
/// The [`FromStr`] implementation accepts the many ways a spreadsheet export
/// writes money (see [`parse_amount`]), and the [`Display`] implementation
/// formats it the Brazilian way, as in `R$1.234,56`.
#[derive(Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Money(f64);

impl Money {
    #[must_use]
    pub fn new(amount: f64) -> Self {
        Self(amount)
    }

    #[must_use]
    pub fn amount(self) -> f64 {
        self.0
    }
}

impl Debug for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = format_decimal(self.0, 2);
        match text.strip_prefix('-') {
            Some(magnitude) => f.pad(&format!("-{CURRENCY_SYMBOL}{magnitude}")),
            None => f.pad(&format!("{CURRENCY_SYMBOL}{text}")),
        }
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_text(s, money_separators).map(Self)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|m| m.0).sum())
    }
}

/// Reads a numeric or monetary value from `cell`.
///
/// Numbers pass through unchanged, and empty cells give `Ok(None)`. Text is
/// cleaned up before parsing: the `R$` symbol is dropped, a leading minus or
/// a parenthesis wrapper makes the value negative, and the decimal mark is
/// worked out from the separators present:
///
/// * both `,` and `.`: dots separate thousands, the comma is the decimal mark
/// * only `,`: a decimal mark if exactly two digits follow the last one,
///   otherwise a thousands separator
/// * only `.`: the dot is the decimal mark
///
/// ```
/// # use sales_ranking::{money::parse_amount, Cell};
/// let cell = Cell::Text("R$ (1.234,56)".into());
/// assert_eq!(parse_amount(&cell).unwrap(), Some(-1234.56));
/// assert_eq!(parse_amount(&Cell::Empty).unwrap(), None);
/// ```
///
/// # Errors
///
/// Returns [`Error::UnparseableAmount`] if nothing numeric is left after
/// cleanup.
pub fn parse_amount(cell: &Cell) -> Result<Option<f64>> {
    parse_cell(cell, money_separators)
}

/// Reads a weight or unit count from `cell`.
///
/// Cleanup is the same as for [`parse_amount`], except that a lone `,` is
/// always the decimal mark, since weights are written to three places.
///
/// ```
/// # use sales_ranking::{money::parse_quantity, Cell};
/// assert_eq!(parse_quantity(&Cell::Text("2,125".into())).unwrap(), Some(2.125));
/// assert_eq!(parse_quantity(&Cell::Text("1.250,5".into())).unwrap(), Some(1250.5));
/// ```
///
/// # Errors
///
/// Returns [`Error::UnparseableAmount`] if nothing numeric is left after
/// cleanup.
pub fn parse_quantity(cell: &Cell) -> Result<Option<f64>> {
    parse_cell(cell, quantity_separators)
}

fn parse_cell(cell: &Cell, separators: fn(&str) -> String) -> Result<Option<f64>> {
    match cell {
        Cell::Number(n) => Ok(Some(*n)),
        Cell::Empty => Ok(None),
        Cell::Text(s) if s.trim().is_empty() => Ok(None),
        Cell::Text(s) => parse_text(s, separators).map(Some),
        Cell::Date(d) => Err(Error::UnparseableAmount(d.to_string())),
    }
}

fn parse_text(raw: &str, separators: fn(&str) -> String) -> Result<f64> {
    let value = raw.replace(CURRENCY_SYMBOL, "");
    let value = value.trim();
    let negative = value.starts_with('-') || value.contains(['(', ')']);
    let mut digits = NOISE.replace_all(value, "").into_owned();
    // a minus anywhere but the front is noise
    if digits.get(1..).is_some_and(|rest| rest.contains('-')) {
        digits.retain(|c| c != '-');
    }
    let number: f64 = separators(&digits)
        .parse()
        .map_err(|_| Error::UnparseableAmount(raw.to_string()))?;
    Ok(if negative { -number.abs() } else { number.abs() })
}

fn money_separators(digits: &str) -> String {
    match (digits.contains(','), digits.contains('.')) {
        (true, true) => digits.replace('.', "").replace(',', "."),
        (true, false) => match digits.rsplit_once(',') {
            Some((whole, cents)) if cents.len() == 2 => {
                format!("{}.{cents}", whole.replace(',', ""))
            }
            _ => digits.replace(',', ""),
        },
        _ => digits.to_string(),
    }
}

fn quantity_separators(digits: &str) -> String {
    if digits.contains(',') {
        digits.replace('.', "").replace(',', ".")
    } else {
        digits.to_string()
    }
}

/// Formats `value` to `decimals` places, with `.` between thousands and `,`
/// as the decimal mark.
///
/// ```
/// # use sales_ranking::money::format_decimal;
/// assert_eq!(format_decimal(1234567.891, 3), "1.234.567,891");
/// assert_eq!(format_decimal(-12.5, 2), "-12,50");
/// ```
#[must_use]
pub fn format_decimal(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let mut text = String::with_capacity(fixed.len() + whole.len() / 3 + 1);
    if value < 0.0 && fixed.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        text.push('-');
    }
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            text.push('.');
        }
        text.push(digit);
    }
    if !fraction.is_empty() {
        text.push(',');
        text.push_str(fraction);
    }
    text
}

/// Formats a margin percentage, as in `12,34%`.
#[must_use]
pub fn format_percent(value: f64) -> String {
    format!("{}%", format_decimal(value, 2))
}
