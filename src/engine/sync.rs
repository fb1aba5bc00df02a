use crate::config::EmptyFetchPolicy;
use crate::engine::{apply_rules, epoch, require_family, require_token, Pipeline};
use crate::error::{ErrorType, IntoResult};
use crate::model::{
    Amount, ClassifiedTransaction, FlowType, MonthCommit, MonthlyBudget, YearMonth,
};
use crate::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument};

/// What a sync did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncReport {
    pub family_id: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// Transactions the provider returned.
    pub fetched: usize,
    /// Transactions that survived the exclusion rules.
    pub classified: usize,
    /// True when the current month was recomputed from scratch because the rules had changed.
    pub recomputed: bool,
    /// The budget records that were written, in month order.
    pub months: Vec<MonthlyBudget>,
}

impl Pipeline {
    /// Pulls new transactions for the family's account and folds them into the monthly ledger.
    ///
    /// Months are committed one at a time. If a later month fails, the earlier ones stay written
    /// and the sync can simply be run again: a transaction is never counted twice. Of two syncs of
    /// one family that fold the same transaction, the later one fails with a store conflict.
    pub async fn sync(&self, family_id: &str, access_token: &str) -> Result<SyncReport> {
        self.sync_at(family_id, access_token, Utc::now()).await
    }

    /// `sync` with an explicit clock. The current month is the month of `now` in local time.
    #[instrument(skip(self, access_token), fields(run = %uuid::Uuid::new_v4()))]
    pub async fn sync_at(
        &self,
        family_id: &str,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<SyncReport> {
        require_family(family_id)?;
        require_token(access_token)?;

        let current = YearMonth::from_date(now.with_timezone(&Local).date_naive());
        let state = self
            .store
            .get_sync_state(family_id)
            .await
            .pub_result(ErrorType::Store)?;
        let rules_changed = state.rules_changed();

        let window_start = match state.cursor() {
            Some(cursor) if !rules_changed => cursor.with_timezone(&Local).date_naive(),
            _ => epoch(),
        };
        let window_end = current.last_day();
        debug!(%current, %window_start, %window_end, rules_changed, "Determined fetch window");

        let fetched = self
            .source()?
            .list_transactions(access_token, window_start, window_end)
            .await
            .pub_result(ErrorType::UpstreamFetch)?;

        let mut report = SyncReport {
            family_id: family_id.to_string(),
            window_start,
            window_end,
            fetched: fetched.len(),
            classified: 0,
            recomputed: false,
            months: Vec::new(),
        };

        let recompute_empty = self.empty_fetch_policy == EmptyFetchPolicy::Recompute;
        if fetched.is_empty() && !(rules_changed && recompute_empty) {
            if rules_changed {
                // Nothing to reapply the rules to; clear the mark and keep the cursor.
                self.store
                    .commit_sync_state(&state, state.cursor())
                    .await
                    .pub_result(ErrorType::Store)?;
            }
            info!("No transactions between {window_start} and {window_end}");
            return Ok(report);
        }

        let rules = self
            .store
            .get_rules(family_id)
            .await
            .pub_result(ErrorType::Store)?;
        let classified = apply_rules(&fetched, &rules);
        report.classified = classified.len();

        let mut by_month: BTreeMap<YearMonth, Vec<&ClassifiedTransaction>> = BTreeMap::new();
        for c in &classified {
            by_month.entry(c.transaction().month()).or_default().push(c);
        }
        if rules_changed {
            // The current month is recomputed even if every one of its transactions is excluded.
            by_month.entry(current).or_default();
        }

        let known = self
            .store
            .synced_ids(family_id)
            .await
            .pub_result(ErrorType::Store)?;

        for (month, transactions) in by_month {
            let replace = rules_changed && month == current;
            let fresh = unseen(transactions, &known, replace);
            if fresh.is_empty() && !replace {
                debug!(%month, "Every transaction was already folded in");
                continue;
            }

            let existing = self
                .store
                .get_budget(family_id, month)
                .await
                .pub_result(ErrorType::Store)?;
            let (mut income, mut expenses) = match (&existing, replace) {
                (Some(budget), false) => (budget.income, budget.expenses),
                _ => (Amount::ZERO, Amount::ZERO),
            };
            let (new_income, new_expenses) = totals(&fresh);
            income += new_income;
            expenses += new_expenses;
            debug!(%month, replace, %new_income, %new_expenses, "Folding month");

            let commit = MonthCommit {
                family_id: family_id.to_string(),
                month,
                expected_version: existing.as_ref().map(|b| b.version),
                income,
                expenses,
                last_sync: now,
                transaction_ids: fresh.iter().map(|c| c.transaction().id().to_string()).collect(),
                replace,
            };
            let written = self
                .store
                .commit_month(&commit)
                .await
                .pub_result(ErrorType::Store)?;
            report.recomputed |= replace;
            report.months.push(written);
        }

        self.store
            .commit_sync_state(&state, Some(now))
            .await
            .pub_result(ErrorType::Store)?;
        info!(
            "Synced {} transactions into {} months",
            report.classified,
            report.months.len()
        );
        Ok(report)
    }
}

/// The transactions that have not been folded in yet, or all of them when the month is replaced.
/// A transaction that appears twice in one fetch is kept once.
fn unseen<'a>(
    transactions: Vec<&'a ClassifiedTransaction>,
    known: &HashSet<String>,
    replace: bool,
) -> Vec<&'a ClassifiedTransaction> {
    let mut seen = HashSet::new();
    transactions
        .into_iter()
        .filter(|c| replace || !known.contains(c.transaction().id()))
        .filter(|c| seen.insert(c.transaction().id().to_string()))
        .collect()
}

/// Sums credits (as positive numbers) into income and debits into expenses.
fn totals(transactions: &[&ClassifiedTransaction]) -> (Amount, Amount) {
    transactions
        .iter()
        .fold((Amount::ZERO, Amount::ZERO), |(income, expenses), c| {
            let amount = c.transaction().amount();
            match c.flow_type() {
                FlowType::Income => (income + amount.abs(), expenses),
                FlowType::Expense => (income, expenses + amount),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Db, LedgerStore};
    use crate::model::{RuleSet, RuleUpdate, Rules, SyncState, Transaction};
    use crate::test::TestEnv;
    use crate::TestSource;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::str::FromStr;
    use std::sync::Arc;

    const FAMILY: &str = "fam";
    const TOKEN: &str = "access-sandbox-1";

    fn t(id: &str, date: &str, amount: &str) -> Transaction {
        Transaction::new(
            id,
            NaiveDate::from_str(date).unwrap(),
            Amount::from_str(amount).unwrap(),
        )
    }

    fn amount(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    /// Midday on the 15th so that the local date is the 15th in any timezone.
    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    fn march() -> YearMonth {
        YearMonth::new(2024, 3).unwrap()
    }

    async fn budget(env: &TestEnv, month: YearMonth) -> MonthlyBudget {
        env.db().get_budget(FAMILY, month).await.unwrap().unwrap()
    }

    fn exclude(id: &str) -> RuleUpdate {
        RuleUpdate {
            transaction_id: Some(id.into()),
            merchant: None,
            apply_to_all: false,
            category: None,
            exclude: true,
            flow_type: FlowType::Expense,
        }
    }

    #[tokio::test]
    async fn test_expenses_and_income_for_month() {
        let env = TestEnv::new().await;
        env.source()
            .push([t("1", "2024-03-05", "100"), t("2", "2024-03-05", "-20")])
            .await;

        let report = env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 15)).await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.window_start, epoch());
        assert_eq!(report.window_end, NaiveDate::from_str("2024-03-31").unwrap());

        let b = budget(&env, march()).await;
        assert_eq!(b.expenses(), amount("100"));
        assert_eq!(b.income(), amount("20"));
        assert_eq!(b.last_sync(), Some(at(2024, 3, 15)));
    }

    #[tokio::test]
    async fn test_second_sync_is_idempotent() {
        let env = TestEnv::new().await;
        env.source()
            .push([t("1", "2024-03-05", "100"), t("2", "2024-03-15", "40")])
            .await;
        env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 15)).await.unwrap();
        let first = budget(&env, march()).await;

        // The cursor day is fetched again but nothing is counted twice.
        let report = env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 15)).await.unwrap();
        assert_eq!(report.fetched, 1);
        assert!(report.months.is_empty());
        let second = budget(&env, march()).await;
        assert_eq!(first.expenses(), second.expenses());
        assert_eq!(first.income(), second.income());

        let requests = env.source().requests().await;
        assert_eq!(requests[1].start, NaiveDate::from_str("2024-03-15").unwrap());
    }

    #[tokio::test]
    async fn test_incremental_equals_single_sync() {
        let all = [
            t("1", "2024-02-27", "10"),
            t("2", "2024-03-02", "-500"),
            t("3", "2024-03-10", "25.50"),
            t("4", "2024-03-20", "4.50"),
        ];

        let once = TestEnv::new().await;
        once.source().push(all.clone()).await;
        once.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 25)).await.unwrap();

        let stepped = TestEnv::new().await;
        stepped.source().push(all[..2].to_vec()).await;
        stepped.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 5)).await.unwrap();
        stepped.source().push(all[2..].to_vec()).await;
        stepped.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 25)).await.unwrap();

        for month in [march(), march().prev()] {
            let a = budget(&once, month).await;
            let b = budget(&stepped, month).await;
            assert_eq!(a.income(), b.income(), "{month}");
            assert_eq!(a.expenses(), b.expenses(), "{month}");
        }
        assert_eq!(budget(&stepped, march()).await.expenses(), amount("30"));
    }

    #[tokio::test]
    async fn test_sync_spans_month_boundary() {
        let env = TestEnv::new().await;
        env.source()
            .push([t("1", "2024-02-28", "70"), t("2", "2024-03-01", "30")])
            .await;
        let report = env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 15)).await.unwrap();
        assert_eq!(report.months.len(), 2);
        assert_eq!(budget(&env, march().prev()).await.expenses(), amount("70"));
        assert_eq!(budget(&env, march()).await.expenses(), amount("30"));
    }

    #[tokio::test]
    async fn test_rule_change_recomputes_current_month() {
        let env = TestEnv::new().await;
        env.source()
            .push([t("1", "2024-03-05", "100"), t("2", "2024-03-06", "50")])
            .await;
        env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 10)).await.unwrap();
        assert_eq!(budget(&env, march()).await.expenses(), amount("150"));

        env.pipeline().update_rule(FAMILY, &exclude("1")).await.unwrap();
        env.source().push([t("3", "2024-03-12", "5")]).await;
        let report = env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 15)).await.unwrap();
        assert!(report.recomputed);
        assert_eq!(report.window_start, epoch());

        // Equal to classifying [epoch, end of month] from scratch.
        assert_eq!(budget(&env, march()).await.expenses(), amount("55"));
        let state = env.db().get_sync_state(FAMILY).await.unwrap();
        assert!(!state.rules_changed());

        // Back to incremental afterwards.
        let report = env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 16)).await.unwrap();
        assert!(!report.recomputed);
        assert_eq!(report.window_start, NaiveDate::from_str("2024-03-15").unwrap());
        assert_eq!(budget(&env, march()).await.expenses(), amount("55"));
    }

    #[tokio::test]
    async fn test_rule_change_does_not_recompute_past_months() {
        let env = TestEnv::new().await;
        env.source()
            .push([t("1", "2024-02-05", "100"), t("2", "2024-03-06", "50")])
            .await;
        env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 10)).await.unwrap();
        env.pipeline().update_rule(FAMILY, &exclude("1")).await.unwrap();
        env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 15)).await.unwrap();
        assert_eq!(budget(&env, march().prev()).await.expenses(), amount("100"));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_rules_changed() {
        let env = TestEnv::new().await;
        env.pipeline().update_rule(FAMILY, &exclude("1")).await.unwrap();
        env.source().set_failing(true).await;
        let err = env
            .pipeline()
            .sync_at(FAMILY, TOKEN, at(2024, 3, 15))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::UpstreamFetch);
        assert!(env.db().get_sync_state(FAMILY).await.unwrap().rules_changed());
    }

    #[tokio::test]
    async fn test_empty_fetch_skip_clears_flag_only() {
        let env = TestEnv::new().await;
        env.source().push([t("1", "2024-03-05", "100")]).await;
        env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 10)).await.unwrap();
        env.pipeline().update_rule(FAMILY, &exclude("1")).await.unwrap();

        // A source that now returns nothing at all.
        let empty = env.pipeline_with(TestSource::new(Vec::new()));
        let report = empty.sync_at(FAMILY, TOKEN, at(2024, 3, 15)).await.unwrap();
        assert!(report.months.is_empty());
        assert_eq!(budget(&env, march()).await.expenses(), amount("100"));
        let state = env.db().get_sync_state(FAMILY).await.unwrap();
        assert!(!state.rules_changed());
        assert_eq!(state.cursor(), Some(at(2024, 3, 10)), "cursor is not advanced");
    }

    #[tokio::test]
    async fn test_empty_fetch_recompute_resets_current_month() {
        let env = TestEnv::new().await;
        env.source().push([t("1", "2024-03-05", "100")]).await;
        env.pipeline().sync_at(FAMILY, TOKEN, at(2024, 3, 10)).await.unwrap();
        env.pipeline().update_rule(FAMILY, &exclude("1")).await.unwrap();

        let pipeline = env
            .pipeline_with(TestSource::new(Vec::new()))
            .with_empty_fetch_policy(EmptyFetchPolicy::Recompute);
        let report = pipeline.sync_at(FAMILY, TOKEN, at(2024, 3, 15)).await.unwrap();
        assert!(report.recomputed);
        assert_eq!(budget(&env, march()).await.expenses(), Amount::ZERO);
        assert!(!env.db().get_sync_state(FAMILY).await.unwrap().rules_changed());
    }

    #[tokio::test]
    async fn test_validation() {
        let env = TestEnv::new().await;
        let err = env.pipeline().sync(FAMILY, "").await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        let err = env.pipeline().sync(" ", TOKEN).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert!(env.source().requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_families_are_independent() {
        let env = TestEnv::new().await;
        env.source().push([t("1", "2024-03-05", "100")]).await;
        let (a, b) = tokio::join!(
            env.pipeline().sync_at("a", TOKEN, at(2024, 3, 15)),
            env.pipeline().sync_at("b", TOKEN, at(2024, 3, 15)),
        );
        a.unwrap();
        b.unwrap();
        for family in ["a", "b"] {
            let budget = env.db().get_budget(family, march()).await.unwrap().unwrap();
            assert_eq!(budget.expenses(), amount("100"));
        }
    }

    /// Runs a whole rival sync of the same family right after the first `synced_ids` read, so that
    /// the outer sync folds from a stale view of what was already counted.
    struct RacingStore {
        db: Db,
        rival: tokio::sync::Mutex<Option<Pipeline>>,
    }

    #[async_trait]
    impl LedgerStore for RacingStore {
        async fn get_budget(
            &self,
            family_id: &str,
            month: YearMonth,
        ) -> anyhow::Result<Option<MonthlyBudget>> {
            self.db.get_budget(family_id, month).await
        }

        async fn commit_month(&self, commit: &MonthCommit) -> anyhow::Result<MonthlyBudget> {
            self.db.commit_month(commit).await
        }

        async fn synced_ids(&self, family_id: &str) -> anyhow::Result<HashSet<String>> {
            let ids = self.db.synced_ids(family_id).await?;
            let rival = self.rival.lock().await.take();
            if let Some(rival) = rival {
                rival.sync_at(family_id, TOKEN, at(2024, 3, 15)).await?;
            }
            Ok(ids)
        }

        async fn get_rules(&self, family_id: &str) -> anyhow::Result<Rules> {
            self.db.get_rules(family_id).await
        }

        async fn update_rule(
            &self,
            family_id: &str,
            update: &RuleUpdate,
        ) -> anyhow::Result<RuleSet> {
            self.db.update_rule(family_id, update).await
        }

        async fn get_sync_state(&self, family_id: &str) -> anyhow::Result<SyncState> {
            self.db.get_sync_state(family_id).await
        }

        async fn commit_sync_state(
            &self,
            observed: &SyncState,
            cursor: Option<DateTime<Utc>>,
        ) -> anyhow::Result<SyncState> {
            self.db.commit_sync_state(observed, cursor).await
        }
    }

    #[tokio::test]
    async fn test_racing_syncs_of_one_family_count_once() {
        let env = TestEnv::new().await;
        let fetch = || TestSource::new(vec![t("x1", "2024-03-05", "100")]);
        let store = RacingStore {
            db: env.db().clone(),
            rival: tokio::sync::Mutex::new(Some(env.pipeline_with(fetch()))),
        };
        let pipeline = Pipeline::new(Arc::new(store), Arc::new(fetch()));

        let err = pipeline
            .sync_at(FAMILY, TOKEN, at(2024, 3, 15))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Store);
        assert!(err.is_conflict());
        assert_eq!(budget(&env, march()).await.expenses(), amount("100"));

        // Running the losing sync again finds nothing new.
        let report = env
            .pipeline_with(fetch())
            .sync_at(FAMILY, TOKEN, at(2024, 3, 16))
            .await
            .unwrap();
        assert!(report.months.is_empty());
        assert_eq!(budget(&env, march()).await.expenses(), amount("100"));
    }

    #[test]
    fn test_totals() {
        let a = ClassifiedTransaction::new(t("1", "2024-03-05", "100"), "x");
        let b = ClassifiedTransaction::new(t("2", "2024-03-05", "-20"), "x");
        let c = ClassifiedTransaction::new(t("3", "2024-03-05", "0"), "x");
        assert_eq!(totals(&[&a, &b, &c]), (amount("20"), amount("100")));
    }
}
