//! Implements `TransactionSource` using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without calling the provider.

use crate::api::TransactionSource;
use crate::error::Res;
use crate::model::{Amount, Transaction};
use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Cursor;
use std::str::FromStr;
use tokio::sync::Mutex;

/// One call made to a `TestSource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub access_token: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A `TransactionSource` that serves whatever transactions it holds, filtered to the requested
/// window, and remembers every request made of it.
#[derive(Debug, Default)]
pub struct TestSource {
    transactions: Mutex<Vec<Transaction>>,
    requests: Mutex<Vec<FetchRequest>>,
    failing: Mutex<bool>,
}

impl TestSource {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions: Mutex::new(transactions),
            ..Self::default()
        }
    }

    /// A source holding the seed data from this module.
    pub fn seeded() -> anyhow::Result<Self> {
        Ok(Self::new(load_csv(SEED_DATA)?))
    }

    /// Makes more transactions available to later fetches.
    pub async fn push(&self, transactions: impl IntoIterator<Item = Transaction>) {
        self.transactions.lock().await.extend(transactions);
    }

    /// While failing, every fetch returns an error.
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }

    /// Every request made so far, oldest first.
    pub async fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl TransactionSource for TestSource {
    async fn list_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<Transaction>> {
        self.requests.lock().await.push(FetchRequest {
            access_token: access_token.to_string(),
            start,
            end,
        });
        if *self.failing.lock().await {
            bail!("The test source is set to fail");
        }
        Ok(self
            .transactions
            .lock()
            .await
            .iter()
            .filter(|t| t.date() >= start && t.date() <= end)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    transaction_id: String,
    date: String,
    amount: String,
    merchant_name: String,
    primary_category: String,
    /// Semicolon separated.
    categories: String,
}

/// Loads transactions from a CSV-formatted string.
fn load_csv(csv_data: &str) -> Res<Vec<Transaction>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(Cursor::new(csv_data.as_bytes()));

    let mut transactions = Vec::new();
    for (i, result) in reader.deserialize::<SeedRow>().enumerate() {
        let row = result.with_context(|| format!("Bad seed row {}", i + 1))?;
        let date = NaiveDate::from_str(&row.date)
            .with_context(|| format!("Bad date on seed row {}", i + 1))?;
        let amount = Amount::from_str(&row.amount)
            .with_context(|| format!("Bad amount on seed row {}", i + 1))?;
        let mut t = Transaction::new(row.transaction_id, date, amount).with_provider_categories(
            row.categories
                .split(';')
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        );
        if !row.merchant_name.is_empty() {
            t = t.with_merchant(row.merchant_name);
        }
        if !row.primary_category.is_empty() {
            t = t.with_primary_category(row.primary_category);
        }
        transactions.push(t);
    }
    Ok(transactions)
}

/// Seed transaction data. Positive amounts are money leaving the account.
const SEED_DATA: &str = r##"transaction_id,date,amount,merchant_name,primary_category,categories
seed-0101,2024-01-02,1450.00,Maple Street Properties,RENT_AND_UTILITIES,Payment;Rent
seed-0102,2024-01-05,-3200.00,Northwind Payroll,INCOME,Transfer;Payroll
seed-0103,2024-01-09,86.12,Fresh Market,FOOD_AND_DRINK,Shops;Supermarkets and Groceries
seed-0104,2024-01-14,42.50,City Power,RENT_AND_UTILITIES,Service;Utilities
seed-0105,2024-01-21,23.80,Corner Cafe,FOOD_AND_DRINK,Food and Drink;Restaurants
seed-0106,2024-01-28,61.40,Fresh Market,FOOD_AND_DRINK,Shops;Supermarkets and Groceries
seed-0201,2024-02-01,1450.00,Maple Street Properties,RENT_AND_UTILITIES,Payment;Rent
seed-0202,2024-02-05,-3200.00,Northwind Payroll,INCOME,Transfer;Payroll
seed-0203,2024-02-07,112.45,Fresh Market,FOOD_AND_DRINK,Shops;Supermarkets and Groceries
seed-0204,2024-02-14,78.00,Rosewood Florist,,Shops;Florists
seed-0205,2024-02-15,44.10,City Power,RENT_AND_UTILITIES,Service;Utilities
seed-0206,2024-02-22,19.99,StreamCo,ENTERTAINMENT,Service;Subscription
seed-0207,2024-02-26,-45.00,Fresh Market,FOOD_AND_DRINK,Shops;Supermarkets and Groceries
seed-0301,2024-03-01,1450.00,Maple Street Properties,RENT_AND_UTILITIES,Payment;Rent
seed-0302,2024-03-05,-3200.00,Northwind Payroll,INCOME,Transfer;Payroll
seed-0303,2024-03-06,95.33,Fresh Market,FOOD_AND_DRINK,Shops;Supermarkets and Groceries
seed-0304,2024-03-11,31.75,Corner Cafe,FOOD_AND_DRINK,Food and Drink;Restaurants
seed-0305,2024-03-15,43.90,City Power,RENT_AND_UTILITIES,Service;Utilities
seed-0306,2024-03-19,250.00,,TRANSFER_OUT,Transfer
seed-0307,2024-03-22,19.99,StreamCo,ENTERTAINMENT,Service;Subscription
seed-0308,2024-03-28,-120.00,Tax Refund,INCOME,Transfer;Deposit
"##;

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    #[test]
    fn test_seed_data_loads() {
        let txns = load_csv(SEED_DATA).unwrap();
        assert_eq!(txns.len(), 21);
        let florist = txns.iter().find(|t| t.id() == "seed-0204").unwrap();
        assert!(florist.primary_category.is_none());
        assert_eq!(florist.provider_categories, vec!["Shops", "Florists"]);
        let transfer = txns.iter().find(|t| t.id() == "seed-0306").unwrap();
        assert!(transfer.merchant_name().is_none());
    }

    #[tokio::test]
    async fn test_window_is_inclusive_and_recorded() {
        let source = TestSource::seeded().unwrap();
        let txns = source
            .list_transactions("tok", date("2024-03-01"), date("2024-03-05"))
            .await
            .unwrap();
        let ids: Vec<&str> = txns.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["seed-0301", "seed-0302"]);

        let requests = source.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].start, date("2024-03-01"));
        assert_eq!(requests[0].access_token, "tok");
    }

    #[tokio::test]
    async fn test_failing() {
        let source = TestSource::new(Vec::new());
        source.set_failing(true).await;
        assert!(source
            .list_transactions("tok", date("2024-03-01"), date("2024-03-31"))
            .await
            .is_err());
        source.set_failing(false).await;
        assert!(source
            .list_transactions("tok", date("2024-03-01"), date("2024-03-31"))
            .await
            .unwrap()
            .is_empty());
    }
}
