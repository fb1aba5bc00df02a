use super::{Db, LedgerStore};
use crate::error::{Res, StoreConflict};
use crate::model::{
    Amount, FlowType, MonthCommit, MonthlyBudget, RuleSet, RuleUpdate, Rules, SyncState,
    YearMonth,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Sqlite, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, trace};

type BudgetRow = (String, String, String, String, Option<String>, i64);
type RuleSetRow = (String, String, String, String);
type SyncStateRow = (String, Option<String>, i64, i64);

#[async_trait]
impl LedgerStore for Db {
    async fn get_budget(
        &self,
        family_id: &str,
        month: YearMonth,
    ) -> anyhow::Result<Option<MonthlyBudget>> {
        let row: Option<BudgetRow> = sqlx::query_as(
            "SELECT family_id, month, income, expenses, last_sync, version \
             FROM budget WHERE family_id = ? AND month = ?",
        )
        .bind(family_id)
        .bind(month.to_string())
        .fetch_optional(self.pool())
        .await
        .with_context(|| format!("Unable to read the {month} budget for '{family_id}'"))?;
        row.map(budget_from_row).transpose()
    }

    async fn commit_month(&self, commit: &MonthCommit) -> anyhow::Result<MonthlyBudget> {
        let month = commit.month.to_string();
        let last_sync = commit.last_sync.to_rfc3339();
        let mut tx = self
            .pool()
            .begin()
            .await
            .context("Unable to begin a budget transaction")?;

        let (affected, version) = match commit.expected_version {
            None => {
                let result = sqlx::query(
                    "INSERT INTO budget (family_id, month, income, expenses, last_sync, version) \
                     VALUES (?, ?, ?, ?, ?, 1) ON CONFLICT (family_id, month) DO NOTHING",
                )
                .bind(&commit.family_id)
                .bind(&month)
                .bind(decimal_text(commit.income))
                .bind(decimal_text(commit.expenses))
                .bind(&last_sync)
                .execute(&mut *tx)
                .await
                .context("Unable to insert a budget record")?;
                (result.rows_affected(), 1)
            }
            Some(expected) => {
                let result = sqlx::query(
                    "UPDATE budget SET income = ?, expenses = ?, last_sync = ?, \
                     version = version + 1 \
                     WHERE family_id = ? AND month = ? AND version = ?",
                )
                .bind(decimal_text(commit.income))
                .bind(decimal_text(commit.expenses))
                .bind(&last_sync)
                .bind(&commit.family_id)
                .bind(&month)
                .bind(expected)
                .execute(&mut *tx)
                .await
                .context("Unable to update a budget record")?;
                (result.rows_affected(), expected + 1)
            }
        };

        if affected == 0 {
            return Err(anyhow::Error::new(StoreConflict {
                table: "budget",
                key: format!("{}/{}", commit.family_id, month),
            }));
        }

        if commit.replace {
            sqlx::query("DELETE FROM synced_transactions WHERE family_id = ? AND month = ?")
                .bind(&commit.family_id)
                .bind(&month)
                .execute(&mut *tx)
                .await
                .context("Unable to clear the synced transaction ids")?;
        }
        // An additive fold must own every id it records. If another sync recorded one of them
        // first, the totals above already include it and the whole commit is rolled back.
        let insert_id = if commit.replace {
            "INSERT INTO synced_transactions (family_id, transaction_id, month) \
             VALUES (?, ?, ?) \
             ON CONFLICT (family_id, transaction_id) DO UPDATE SET month = excluded.month"
        } else {
            "INSERT INTO synced_transactions (family_id, transaction_id, month) \
             VALUES (?, ?, ?) \
             ON CONFLICT (family_id, transaction_id) DO NOTHING"
        };
        for id in &commit.transaction_ids {
            let result = sqlx::query(insert_id)
                .bind(&commit.family_id)
                .bind(id)
                .bind(&month)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Unable to record synced transaction '{id}'"))?;
            if result.rows_affected() == 0 {
                return Err(anyhow::Error::new(StoreConflict {
                    table: "synced_transactions",
                    key: format!("{}/{id}", commit.family_id),
                }));
            }
        }

        tx.commit()
            .await
            .context("Unable to commit the budget transaction")?;
        trace!(
            "Committed {} for '{}' at version {version} with {} transaction ids",
            commit.month,
            commit.family_id,
            commit.transaction_ids.len()
        );

        Ok(MonthlyBudget {
            family_id: commit.family_id.clone(),
            month: commit.month,
            income: commit.income,
            expenses: commit.expenses,
            last_sync: Some(commit.last_sync),
            version,
        })
    }

    async fn synced_ids(&self, family_id: &str) -> anyhow::Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT transaction_id FROM synced_transactions WHERE family_id = ?")
                .bind(family_id)
                .fetch_all(self.pool())
                .await
                .with_context(|| format!("Unable to read synced transaction ids for '{family_id}'"))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn get_rules(&self, family_id: &str) -> anyhow::Result<Rules> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT doctype, excluded_ids, excluded_merchants, id_category, merchant_category \
             FROM rule_sets WHERE family_id = ?",
        )
        .bind(family_id)
        .fetch_all(self.pool())
        .await
        .with_context(|| format!("Unable to read the rule sets for '{family_id}'"))?;

        let mut rules = Rules::default();
        for (doctype, ids, merchants, id_category, merchant_category) in rows {
            let rule_set = rule_set_from_row((ids, merchants, id_category, merchant_category))?;
            match FlowType::from_doctype(&doctype)? {
                FlowType::Income => rules.income = Some(rule_set),
                FlowType::Expense => rules.expense = Some(rule_set),
            }
        }
        Ok(rules)
    }

    async fn update_rule(&self, family_id: &str, update: &RuleUpdate) -> anyhow::Result<RuleSet> {
        let doctype = update.flow_type.doctype();
        let mut tx = self
            .pool()
            .begin()
            .await
            .context("Unable to begin a rule transaction")?;

        let mut rule_set = read_rule_set(&mut tx, family_id, doctype)
            .await?
            .unwrap_or_default();
        rule_set.apply(update);

        sqlx::query(
            "INSERT INTO rule_sets \
             (family_id, doctype, excluded_ids, excluded_merchants, id_category, merchant_category) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (family_id, doctype) DO UPDATE SET \
             excluded_ids = excluded.excluded_ids, \
             excluded_merchants = excluded.excluded_merchants, \
             id_category = excluded.id_category, \
             merchant_category = excluded.merchant_category",
        )
        .bind(family_id)
        .bind(doctype)
        .bind(serde_json::to_string(&rule_set.excluded_ids)?)
        .bind(serde_json::to_string(&rule_set.excluded_merchants)?)
        .bind(serde_json::to_string(&rule_set.id_category)?)
        .bind(serde_json::to_string(&rule_set.merchant_category)?)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Unable to write the {doctype} rule set for '{family_id}'"))?;

        sqlx::query(
            "INSERT INTO sync_state (family_id, rules_generation) VALUES (?, 1) \
             ON CONFLICT (family_id) DO UPDATE SET rules_generation = rules_generation + 1",
        )
        .bind(family_id)
        .execute(&mut *tx)
        .await
        .context("Unable to mark the rules as changed")?;

        tx.commit()
            .await
            .context("Unable to commit the rule transaction")?;
        debug!("Updated the {doctype} rules for '{family_id}'");
        Ok(rule_set)
    }

    async fn get_sync_state(&self, family_id: &str) -> anyhow::Result<SyncState> {
        let row: Option<SyncStateRow> = sqlx::query_as(
            "SELECT family_id, cursor, rules_generation, applied_generation \
             FROM sync_state WHERE family_id = ?",
        )
        .bind(family_id)
        .fetch_optional(self.pool())
        .await
        .with_context(|| format!("Unable to read the sync state for '{family_id}'"))?;

        match row {
            Some((family_id, cursor, rules_generation, applied_generation)) => Ok(SyncState {
                family_id,
                cursor: parse_time(cursor)?,
                rules_generation,
                applied_generation,
            }),
            None => Ok(SyncState::new(family_id)),
        }
    }

    async fn commit_sync_state(
        &self,
        observed: &SyncState,
        cursor: Option<DateTime<Utc>>,
    ) -> anyhow::Result<SyncState> {
        let result = sqlx::query(
            "INSERT INTO sync_state (family_id, cursor, rules_generation, applied_generation) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (family_id) DO UPDATE SET \
             cursor = excluded.cursor, applied_generation = excluded.applied_generation \
             WHERE sync_state.applied_generation = ?",
        )
        .bind(&observed.family_id)
        .bind(cursor.map(|c| c.to_rfc3339()))
        .bind(observed.rules_generation)
        .bind(observed.rules_generation)
        .bind(observed.applied_generation)
        .execute(self.pool())
        .await
        .with_context(|| {
            format!(
                "Unable to write the sync state for '{}'",
                observed.family_id
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(anyhow::Error::new(StoreConflict {
                table: "sync_state",
                key: observed.family_id.clone(),
            }));
        }
        self.get_sync_state(&observed.family_id).await
    }
}

async fn read_rule_set(
    tx: &mut Transaction<'_, Sqlite>,
    family_id: &str,
    doctype: &str,
) -> Res<Option<RuleSet>> {
    let row: Option<RuleSetRow> = sqlx::query_as(
        "SELECT excluded_ids, excluded_merchants, id_category, merchant_category \
         FROM rule_sets WHERE family_id = ? AND doctype = ?",
    )
    .bind(family_id)
    .bind(doctype)
    .fetch_optional(&mut **tx)
    .await
    .with_context(|| format!("Unable to read the {doctype} rule set for '{family_id}'"))?;
    row.map(rule_set_from_row).transpose()
}

fn rule_set_from_row(row: RuleSetRow) -> Res<RuleSet> {
    let (ids, merchants, id_category, merchant_category) = row;
    Ok(RuleSet {
        excluded_ids: serde_json::from_str(&ids).context("Corrupt excluded_ids column")?,
        excluded_merchants: serde_json::from_str(&merchants)
            .context("Corrupt excluded_merchants column")?,
        id_category: serde_json::from_str(&id_category).context("Corrupt id_category column")?,
        merchant_category: serde_json::from_str(&merchant_category)
            .context("Corrupt merchant_category column")?,
    })
}

fn budget_from_row(row: BudgetRow) -> Res<MonthlyBudget> {
    let (family_id, month, income, expenses, last_sync, version) = row;
    Ok(MonthlyBudget {
        family_id,
        month: YearMonth::from_str(&month)?,
        income: parse_decimal(&income)?,
        expenses: parse_decimal(&expenses)?,
        last_sync: parse_time(last_sync)?,
        version,
    })
}

/// Amounts are stored as plain decimal text, never in their display form.
fn decimal_text(amount: Amount) -> String {
    amount.value().to_string()
}

fn parse_decimal(s: &str) -> Res<Amount> {
    let value =
        Decimal::from_str(s).with_context(|| format!("Corrupt decimal value '{s}' in budget"))?;
    Ok(Amount::new(value))
}

fn parse_time(s: Option<String>) -> Res<Option<DateTime<Utc>>> {
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("Corrupt timestamp '{s}'"))
    })
    .transpose()
}
