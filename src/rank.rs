use std::num::NonZeroUsize;

use crate::{aggregate::IdentityTotals, classify::Identity, Metric};

/// One line of a ranking.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedEntry {
    /// 1-based.
    pub position: usize,
    pub identity: Identity,
    pub label: String,
    pub value: f64,
    /// Number of sales rows behind the value.
    pub count: usize,
}

/// Whether a page's values can be shown as shares of a whole.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Proportion {
    Drawable,
    /// At least one entry is negative.
    NegativeValues,
    /// The entries sum to zero or less.
    NonPositiveTotal,
}

impl Proportion {
    #[must_use]
    pub fn of(entries: &[RankedEntry]) -> Self {
        if entries.iter().any(|e| e.value < 0.0) {
            Self::NegativeValues
        } else if entries.iter().map(|e| e.value).sum::<f64>() <= 0.0 {
            Self::NonPositiveTotal
        } else {
            Self::Drawable
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    /// 1-based.
    pub number: usize,
    pub entries: Vec<RankedEntry>,
    pub proportion: Proportion,
}

impl Page {
    /// Positions of the first and last entries.
    #[must_use]
    pub fn span(&self) -> (usize, usize) {
        let first = self.entries.first().map_or(0, |e| e.position);
        let last = self.entries.last().map_or(0, |e| e.position);
        (first, last)
    }
}

/// Orders `totals` by `metric`, highest first.
///
/// The sort is stable: entries with equal values keep the order they arrived
/// in.
#[must_use]
pub fn rank(totals: &[IdentityTotals], metric: Metric) -> Vec<RankedEntry> {
    let mut entries: Vec<RankedEntry> = totals
        .iter()
        .map(|t| RankedEntry {
            position: 0,
            identity: t.identity.clone(),
            label: t.label.clone(),
            value: metric.value(&t.totals),
            count: t.totals.count,
        })
        .collect();
    entries.sort_by(|a, b| b.value.total_cmp(&a.value));
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.position = i + 1;
    }
    entries
}

/// Splits `entries` into pages of `size`. Only the last page may be shorter.
#[must_use]
pub fn paginate(entries: Vec<RankedEntry>, size: NonZeroUsize) -> Vec<Page> {
    entries
        .chunks(size.get())
        .enumerate()
        .map(|(i, chunk)| Page {
            number: i + 1,
            entries: chunk.to_vec(),
            proportion: Proportion::of(chunk),
        })
        .collect()
}
