use crate::engine::{require_family, require_token, Pipeline};
use crate::error::{ErrorType, IntoResult};
use crate::model::{
    Amount, ClassifiedTransaction, Dashboard, MonthEntry, Overview, RuleSet, RuleUpdate, YearMonth,
};
use crate::Result;
use chrono::Local;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// How many months the savings history covers, ending with the current month.
const SAVINGS_MONTHS: u32 = 12;

impl Pipeline {
    /// The persisted totals for a month. A month that was never synced is all zeros.
    pub async fn overview(&self, family_id: &str, month: YearMonth) -> Result<Overview> {
        require_family(family_id)?;
        let budget = self
            .store
            .get_budget(family_id, month)
            .await
            .pub_result(ErrorType::Store)?;
        Ok(budget
            .map(|b| Overview {
                income: b.income(),
                expenses: b.expenses(),
                budget: Amount::ZERO,
            })
            .unwrap_or_default())
    }

    /// Income and expenses for the twelve months ending with the current month, oldest first.
    pub async fn savings_history(&self, family_id: &str) -> Result<Vec<MonthEntry>> {
        let current = YearMonth::from_date(Local::now().date_naive());
        self.savings_history_at(family_id, current).await
    }

    /// `savings_history` ending at `current`.
    ///
    /// The months are read concurrently. A month that cannot be read is reported as zeros rather
    /// than failing the whole history.
    pub async fn savings_history_at(
        &self,
        family_id: &str,
        current: YearMonth,
    ) -> Result<Vec<MonthEntry>> {
        require_family(family_id)?;
        let months: Vec<YearMonth> = (0..SAVINGS_MONTHS)
            .rev()
            .map(|back| current.minus(back))
            .collect();
        let mut entries: Vec<MonthEntry> = months.iter().copied().map(MonthEntry::zero).collect();

        let mut reads = JoinSet::new();
        for (i, month) in months.into_iter().enumerate() {
            let store = self.store.clone();
            let family_id = family_id.to_string();
            reads.spawn(async move { (i, month, store.get_budget(&family_id, month).await) });
        }

        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok((i, _, Ok(Some(budget)))) => {
                    entries[i].income = budget.income();
                    entries[i].expenses = budget.expenses();
                }
                Ok((_, _, Ok(None))) => {}
                Ok((_, month, Err(e))) => {
                    warn!("Unable to read the {month} budget for '{family_id}', using zero: {e:#}")
                }
                Err(e) => warn!("A savings history read did not complete, using zero: {e}"),
            }
        }
        Ok(entries)
    }

    /// Everything the budget page shows for `month`: persisted totals, charts and the savings
    /// history, read concurrently. Fails if the charts or the totals fail.
    pub async fn dashboard(
        &self,
        family_id: &str,
        access_token: &str,
        month: YearMonth,
    ) -> Result<Dashboard> {
        let current = YearMonth::from_date(Local::now().date_naive());
        self.dashboard_at(family_id, access_token, month, current)
            .await
    }

    /// `dashboard` with the savings history ending at `current`.
    pub async fn dashboard_at(
        &self,
        family_id: &str,
        access_token: &str,
        month: YearMonth,
        current: YearMonth,
    ) -> Result<Dashboard> {
        require_family(family_id)?;
        require_token(access_token)?;

        let (chart, overview, savings_history) = tokio::try_join!(
            self.chart_data(family_id, access_token, month),
            self.overview(family_id, month),
            self.savings_history_at(family_id, current),
        )?;

        let (expenses, incomes): (Vec<ClassifiedTransaction>, Vec<ClassifiedTransaction>) = chart
            .current_month_transactions
            .iter()
            .cloned()
            .partition(ClassifiedTransaction::is_expense);
        debug!(
            "Dashboard for {month} has {} incomes and {} expenses",
            incomes.len(),
            expenses.len()
        );

        Ok(Dashboard {
            overview,
            incomes,
            expenses,
            chart,
            savings_history,
        })
    }

    /// Excludes or categorizes a transaction, or every transaction from a merchant. The next sync
    /// recomputes the current month with the new rules.
    pub async fn update_rule(&self, family_id: &str, update: &RuleUpdate) -> Result<RuleSet> {
        require_family(family_id)?;
        update.validate().pub_result(ErrorType::Validation)?;
        self.store
            .update_rule(family_id, update)
            .await
            .pub_result(ErrorType::Store)
    }
}
