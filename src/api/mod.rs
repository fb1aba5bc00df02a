//! The transaction source: where bank transactions are fetched from.
//!
//! `PlaidSource` talks to the provider over HTTPS. `TestSource` serves seeded, in-memory data so
//! that the whole program can run without a network, and is the fake used throughout the tests.

mod plaid;
mod test_source;

use crate::config::Config;
use crate::error::{ErrorType, IntoResult, Res};
use crate::model::Transaction;
use crate::Result;
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

pub use plaid::PlaidSource;
pub use test_source::{FetchRequest, TestSource};

/// Set to a non-empty value to run against `TestSource` instead of the live provider.
pub const TEST_MODE_ENV: &str = "LEDGER_IN_TEST_MODE";

/// Environment variable that holds the provider secret.
pub const PROVIDER_SECRET_ENV: &str = "LEDGER_PROVIDER_SECRET";

/// A provider of bank transactions.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Every transaction on the account behind `access_token` dated within `start..=end`.
    async fn list_transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<Transaction>>;
}

/// Selects which `TransactionSource` the program uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Fetch from the configured provider.
    #[default]
    Live,
    /// Serve the seeded in-memory data.
    Testing,
}

impl Mode {
    /// `Mode::Testing` when `LEDGER_IN_TEST_MODE` is set and non-empty, otherwise `Mode::Live`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Testing,
            _ => Mode::Live,
        }
    }
}

/// Builds the `TransactionSource` for `mode`. The live source needs the provider secret; it is an
/// error for it to be missing only in `Mode::Live`.
pub fn transaction_source(
    config: &Config,
    mode: Mode,
    secret: Option<&str>,
) -> Result<Arc<dyn TransactionSource>> {
    match mode {
        Mode::Testing => {
            let source = TestSource::seeded().pub_result(ErrorType::Internal)?;
            Ok(Arc::new(source))
        }
        Mode::Live => {
            let build = || -> Res<PlaidSource> {
                let secret = secret.filter(|s| !s.is_empty()).with_context(|| {
                    format!("The provider secret is required, set {PROVIDER_SECRET_ENV}")
                })?;
                let provider = config.provider();
                PlaidSource::new(provider.base_url()?, &provider.client_id, secret)
            };
            Ok(Arc::new(build().pub_result(ErrorType::Config)?))
        }
    }
}
