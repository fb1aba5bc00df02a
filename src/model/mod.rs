//! Types that represent the core data model, such as `Transaction`, `RuleSet` and `MonthlyBudget`.
mod amount;
mod budget;
mod month;
mod rules;
mod transaction;
mod views;

pub use amount::{Amount, AmountError};
pub use budget::{MonthCommit, MonthlyBudget, SyncState};
pub use month::YearMonth;
pub use rules::{FlowType, RuleSet, RuleUpdate, Rules};
pub use transaction::{ClassifiedTransaction, Transaction, UNCATEGORIZED, UNKNOWN_MERCHANT};
pub use views::{
    Breakdown, BreakdownValues, ChartBundle, CumulativeData, DailySeries, Dashboard, Dimension,
    MonthEntry, Overview,
};
