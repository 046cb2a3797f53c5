use chrono::{Datelike, Days, NaiveDate};
use tracing::{debug, warn};

use std::collections::{BTreeMap, HashMap};

use crate::{
    classify::{Classified, Identity},
    config::NegativeTonnage,
    metric::{Field, Measures, Metric, Totals},
    Transaction,
};

/// Most raw values kept as examples of what failed to parse.
pub const MAX_SAMPLES: usize = 5;

/// Counts of the rows a run could not use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Rows left out because a field the metric needs was missing or unparseable.
    pub dropped: usize,
    /// Values that were present but not numeric.
    pub unparseable: usize,
    /// Rows left out for a negative real quantity.
    pub excluded_negative: usize,
    /// Up to [`MAX_SAMPLES`] of the unparseable raw values.
    pub samples: Vec<String>,
}

impl Diagnostics {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dropped == 0 && self.excluded_negative == 0
    }

    fn unparseable(&mut self, raw: String) {
        self.unparseable += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(raw);
        }
    }
}

/// Parses the `fields` of `row`.
///
/// Returns `None`, and records why in `diagnostics`, if any of them is missing
/// or unparseable. Fields not in `fields` are left at 0.
pub fn measure(row: &Transaction, fields: &[Field], diagnostics: &mut Diagnostics) -> Option<Measures> {
    let mut measures = Measures::default();
    let mut usable = true;
    for &field in fields {
        match field.parse(row) {
            Ok(Some(value)) => measures.set(field, value),
            Ok(None) => usable = false,
            Err(err) => {
                warn!(code = %row.code, %field, "{err}");
                diagnostics.unparseable(field.cell(row).text().unwrap_or_default());
                usable = false;
            }
        }
    }
    if usable {
        Some(measures)
    } else {
        diagnostics.dropped += 1;
        None
    }
}

/// The Monday starting the week that contains `date`.
///
/// ```
/// # use chrono::NaiveDate;
/// # use sales_ranking::aggregate::week_start;
/// let sunday = NaiveDate::from_ymd_opt(2025, 5, 11).unwrap();
/// assert_eq!(week_start(sunday), NaiveDate::from_ymd_opt(2025, 5, 5).unwrap());
/// ```
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

/// Totals for one group or ungrouped product.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityTotals {
    pub identity: Identity,
    pub label: String,
    pub totals: Totals,
}

/// Per-identity totals, in the order identities were first seen.
#[derive(Debug, Default)]
pub struct Ledger {
    index: HashMap<Identity, usize>,
    entries: Vec<IdentityTotals>,
}

impl Ledger {
    /// Adds `measures` to the totals of the row's identity, and returns that
    /// identity's position in the ledger.
    pub fn add(&mut self, classified: &Classified<'_>, measures: Measures) -> usize {
        let slot = match self.index.get(&classified.identity) {
            Some(&slot) => slot,
            None => {
                self.entries.push(IdentityTotals {
                    identity: classified.identity.clone(),
                    label: classified.label.to_string(),
                    totals: Totals::default(),
                });
                let slot = self.entries.len() - 1;
                self.index.insert(classified.identity.clone(), slot);
                slot
            }
        };
        self.entries[slot].totals += measures;
        slot
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<IdentityTotals> {
        self.entries
    }
}

/// One identity's value for one week.
#[derive(Clone, Debug, PartialEq)]
pub struct WeeklyPoint<'a> {
    pub identity: &'a Identity,
    /// Monday of the week.
    pub week: NaiveDate,
    pub value: f64,
}

/// The result of aggregating one metric.
#[derive(Debug)]
pub struct Aggregation {
    pub metric: Metric,
    pub overall: Totals,
    pub by_identity: Vec<IdentityTotals>,
    weekly: BTreeMap<(usize, NaiveDate), Totals>,
    pub diagnostics: Diagnostics,
}

impl Aggregation {
    /// The metric's value over every aggregated row.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.metric.value(&self.overall)
    }

    /// Weekly values, ordered by identity (first seen first) and then by week.
    pub fn weekly(&self) -> impl Iterator<Item = WeeklyPoint<'_>> {
        self.weekly.iter().map(|((slot, week), totals)| WeeklyPoint {
            identity: &self.by_identity[*slot].identity,
            week: *week,
            value: self.metric.value(totals),
        })
    }
}

/// Sums `rows` for `metric`, overall, per identity and per identity and week.
///
/// Rows missing any field the metric needs are dropped. With
/// [`NegativeTonnage::Exclude`], a tonnage run also drops rows whose real
/// quantity is negative.
pub fn aggregate<'a>(
    rows: impl IntoIterator<Item = Classified<'a>>,
    metric: Metric,
    policy: NegativeTonnage,
) -> Aggregation {
    let mut diagnostics = Diagnostics::default();
    let mut overall = Totals::default();
    let mut ledger = Ledger::default();
    let mut weekly: BTreeMap<(usize, NaiveDate), Totals> = BTreeMap::new();
    for classified in rows {
        let Some(measures) = measure(classified.row, metric.fields(), &mut diagnostics) else {
            continue;
        };
        if metric == Metric::Tonnage && policy == NegativeTonnage::Exclude && measures.tonnage < 0.0 {
            debug!(code = %classified.row.code, tonnage = measures.tonnage, "excluding negative tonnage");
            diagnostics.excluded_negative += 1;
            continue;
        }
        overall += measures;
        let slot = ledger.add(&classified, measures);
        *weekly.entry((slot, week_start(classified.row.date))).or_default() += measures;
    }
    if diagnostics.dropped > 0 {
        warn!(
            %metric,
            dropped = diagnostics.dropped,
            unparseable = diagnostics.unparseable,
            samples = ?diagnostics.samples,
            "rows left out of the ranking"
        );
    }
    Aggregation {
        metric,
        overall,
        by_identity: ledger.into_entries(),
        weekly,
        diagnostics,
    }
}
