//! Implements `TransactionSource` against the provider's `/transactions/get` endpoint.

use crate::api::TransactionSource;
use crate::error::Res;
use crate::model::{Amount, Transaction};
use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, trace};
use url::Url;

/// The most transactions the provider will return in one page.
const PAGE_SIZE: u32 = 500;
const TRANSACTIONS_GET: &str = "transactions/get";

/// Fetches transactions from the live provider.
pub struct PlaidSource {
    client: reqwest::Client,
    endpoint: Url,
    client_id: String,
    secret: String,
}

impl PlaidSource {
    /// `base_url` must end with a slash, see `ProviderConfig::base_url`.
    pub fn new(
        base_url: Url,
        client_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Res<Self> {
        let endpoint = base_url
            .join(TRANSACTIONS_GET)
            .with_context(|| format!("Unable to build the provider endpoint from '{base_url}'"))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            client_id: client_id.into(),
            secret: secret.into(),
        })
    }

    async fn fetch_page(&self, request: &GetRequest<'_>) -> Res<GetResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .with_context(|| format!("Unable to reach the provider at {}", self.endpoint))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Unable to read the provider response")?;
        trace!("Provider responded {status} with {} bytes", body.len());

        if !status.is_success() {
            let message = serde_json::from_str::<ProviderError>(&body)
                .map(|e| format!("{}: {}", e.error_code, e.error_message))
                .unwrap_or(body);
            bail!("The provider rejected the request with {status}: {message}");
        }
        serde_json::from_str(&body).context("Unable to parse the provider response")
    }
}

#[async_trait]
impl TransactionSource for PlaidSource {
    async fn list_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<Transaction>> {
        let mut transactions = Vec::new();
        loop {
            let request = GetRequest {
                client_id: &self.client_id,
                secret: &self.secret,
                access_token,
                start_date: start,
                end_date: end,
                options: PageOptions {
                    count: PAGE_SIZE,
                    offset: transactions.len() as u32,
                },
            };
            let page = self.fetch_page(&request).await?;
            let received = page.transactions.len();
            for raw in page.transactions {
                transactions.push(raw.into_transaction()?);
            }
            debug!(
                "Fetched {} of {} transactions between {start} and {end}",
                transactions.len(),
                page.total_transactions
            );
            if received == 0 || transactions.len() as u32 >= page.total_transactions {
                break;
            }
        }
        Ok(transactions)
    }
}

#[derive(Debug, Serialize)]
struct GetRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    options: PageOptions,
}

#[derive(Debug, Serialize)]
struct PageOptions {
    count: u32,
    offset: u32,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    transactions: Vec<RawTransaction>,
    total_transactions: u32,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error_code: String,
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    transaction_id: String,
    date: NaiveDate,
    amount: serde_json::Number,
    #[serde(default)]
    merchant_name: Option<String>,
    #[serde(default)]
    category: Option<Vec<String>>,
    #[serde(default)]
    personal_finance_category: Option<PersonalFinanceCategory>,
}

#[derive(Debug, Deserialize)]
struct PersonalFinanceCategory {
    primary: String,
}

impl RawTransaction {
    fn into_transaction(self) -> Res<Transaction> {
        let amount = parse_number(&self.amount).with_context(|| {
            format!("Bad amount on transaction '{}'", self.transaction_id)
        })?;
        let mut transaction = Transaction::new(self.transaction_id, self.date, amount)
            .with_provider_categories(self.category.unwrap_or_default());
        if let Some(merchant) = self.merchant_name.filter(|m| !m.is_empty()) {
            transaction = transaction.with_merchant(merchant);
        }
        if let Some(pfc) = self.personal_finance_category {
            transaction = transaction.with_primary_category(pfc.primary);
        }
        Ok(transaction)
    }
}

/// JSON numbers are converted through their text so that `12.34` stays exactly `12.34`.
fn parse_number(n: &serde_json::Number) -> Res<Amount> {
    let text = n.to_string();
    let value = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .with_context(|| format!("'{text}' is not a decimal number"))?;
    Ok(Amount::new(value))
}
