//! Read-side structures produced for display. None of these are persisted.

use crate::model::{Amount, ClassifiedTransaction, YearMonth};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A dense, day-by-day running total of spending for one month.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DailySeries {
    pub dates: Vec<NaiveDate>,
    pub cumulative: Vec<Amount>,
}

impl DailySeries {
    /// The cumulative total on the last day, i.e. the month's spending.
    pub fn total(&self) -> Amount {
        self.cumulative.last().copied().unwrap_or_default()
    }
}

/// Cumulative spending curves for the requested month and the month before it.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CumulativeData {
    pub current: DailySeries,
    pub previous: DailySeries,
}

/// Which label spending is grouped under in a `Breakdown`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    #[default]
    Category,
    Merchant,
}

serde_plain::derive_display_from_serialize!(Dimension);
serde_plain::derive_fromstr_from_deserialize!(Dimension);

/// Values aligned to `Breakdown::labels`, one vector per month of the three month window.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BreakdownValues {
    pub current: Vec<Amount>,
    pub previous: Vec<Amount>,
    pub two_months_ago: Vec<Amount>,
}

/// Spending per label across a three month window, sorted by the requested month's spending.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Breakdown {
    pub dimension: Dimension,
    pub labels: Vec<String>,
    pub values: BreakdownValues,
}

impl Breakdown {
    /// The sum of every value in all three months.
    pub fn total(&self) -> Amount {
        self.values
            .current
            .iter()
            .chain(&self.values.previous)
            .chain(&self.values.two_months_ago)
            .sum()
    }
}

/// Everything the spending charts need for one requested month.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChartBundle {
    pub month: Option<YearMonth>,
    /// Every classified transaction, credits and debits, dated in the requested month.
    pub current_month_transactions: Vec<ClassifiedTransaction>,
    pub cumulative: CumulativeData,
    pub categories: Breakdown,
    pub merchants: Breakdown,
}

/// Persisted totals for a month.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Overview {
    pub income: Amount,
    pub expenses: Amount,
    /// Reserved for a planned monthly budget target; always zero today.
    pub budget: Amount,
}

/// One month in the savings history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonthEntry {
    pub month: YearMonth,
    /// e.g. `March 2024`
    pub month_label: String,
    pub income: Amount,
    pub expenses: Amount,
}

impl MonthEntry {
    pub(crate) fn zero(month: YearMonth) -> Self {
        Self {
            month,
            month_label: month.label(),
            income: Amount::ZERO,
            expenses: Amount::ZERO,
        }
    }
}

/// The full budget page: persisted totals, the chart bundle and the savings history.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Dashboard {
    pub overview: Overview,
    /// Credits dated in the requested month.
    pub incomes: Vec<ClassifiedTransaction>,
    /// Debits dated in the requested month.
    pub expenses: Vec<ClassifiedTransaction>,
    pub chart: ChartBundle,
    pub savings_history: Vec<MonthEntry>,
}
