use crate::model::{Amount, YearMonth};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted income and expense totals for one family and one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonthlyBudget {
    pub(crate) family_id: String,
    pub(crate) month: YearMonth,
    /// Sum of credits, as a positive number.
    pub(crate) income: Amount,
    /// Sum of debits.
    pub(crate) expenses: Amount,
    pub(crate) last_sync: Option<DateTime<Utc>>,
    /// Incremented on every write, used for compare-and-swap updates.
    #[serde(skip)]
    pub(crate) version: i64,
}

impl MonthlyBudget {
    /// The zero record that a missing month is treated as.
    pub fn empty(family_id: impl Into<String>, month: YearMonth) -> Self {
        Self {
            family_id: family_id.into(),
            month,
            income: Amount::ZERO,
            expenses: Amount::ZERO,
            last_sync: None,
            version: 0,
        }
    }

    pub fn family_id(&self) -> &str {
        &self.family_id
    }

    pub fn month(&self) -> YearMonth {
        self.month
    }

    pub fn income(&self) -> Amount {
        self.income
    }

    pub fn expenses(&self) -> Amount {
        self.expenses
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }
}

/// Per-family synchronization bookkeeping.
///
/// `cursor` is when the last successful sync ran; the next fetch window starts on that day.
/// Rule edits bump `rules_generation`. A sync that completes records the generation it observed in
/// `applied_generation`, so the rules are "changed" whenever the two differ. A rule edit that lands
/// while a sync is running leaves them different and is picked up by the next sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncState {
    pub(crate) family_id: String,
    pub(crate) cursor: Option<DateTime<Utc>>,
    pub(crate) rules_generation: i64,
    pub(crate) applied_generation: i64,
}

impl SyncState {
    pub fn new(family_id: impl Into<String>) -> Self {
        Self {
            family_id: family_id.into(),
            cursor: None,
            rules_generation: 0,
            applied_generation: 0,
        }
    }

    pub fn family_id(&self) -> &str {
        &self.family_id
    }

    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    /// True if a rule was edited since the last completed sync.
    pub fn rules_changed(&self) -> bool {
        self.rules_generation != self.applied_generation
    }
}

/// Everything needed to fold one month's worth of newly classified transactions into the ledger in
/// a single conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthCommit {
    pub family_id: String,
    pub month: YearMonth,
    /// The version the new totals were computed from. `None` means the record must not exist yet.
    pub expected_version: Option<i64>,
    pub income: Amount,
    pub expenses: Amount,
    pub last_sync: DateTime<Utc>,
    /// Ids of the transactions that contributed to this commit.
    pub transaction_ids: Vec<String>,
    /// When true the month's previously recorded transaction ids are forgotten first.
    pub replace: bool,
}
