//! The sync and aggregation pipeline.
//!
//! `Pipeline` owns no data. Every operation reads from the `LedgerStore` and the
//! `TransactionSource` it was built with, so one `Pipeline` can serve any number of families
//! concurrently.

mod aggregate;
mod classify;
mod overview;
mod sync;

use crate::api::TransactionSource;
use crate::config::EmptyFetchPolicy;
use crate::db::LedgerStore;
use crate::error::{Error, ErrorType};
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

pub use aggregate::{breakdown, cumulative_series};
pub use classify::apply_rules;
pub use sync::SyncReport;

/// The day a full re-fetch starts from.
pub(crate) fn epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

/// Runs syncs and builds views for families.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn LedgerStore>,
    source: Option<Arc<dyn TransactionSource>>,
    empty_fetch_policy: EmptyFetchPolicy,
}

impl Pipeline {
    pub fn new(store: Arc<dyn LedgerStore>, source: Arc<dyn TransactionSource>) -> Self {
        Self {
            store,
            source: Some(source),
            empty_fetch_policy: EmptyFetchPolicy::default(),
        }
    }

    /// A pipeline for the operations that only touch the store: `overview`, `savings_history`
    /// and `update_rule`. Anything that fetches returns an `Internal` error.
    pub fn store_only(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            source: None,
            empty_fetch_policy: EmptyFetchPolicy::default(),
        }
    }

    pub fn with_empty_fetch_policy(mut self, policy: EmptyFetchPolicy) -> Self {
        self.empty_fetch_policy = policy;
        self
    }

    pub fn empty_fetch_policy(&self) -> EmptyFetchPolicy {
        self.empty_fetch_policy
    }

    fn source(&self) -> Result<&dyn TransactionSource> {
        self.source.as_deref().ok_or_else(|| {
            Error::new(
                ErrorType::Internal,
                anyhow::anyhow!("This pipeline was built without a transaction source"),
            )
        })
    }
}

fn require_family(family_id: &str) -> Result<()> {
    if family_id.trim().is_empty() {
        return Err(Error::validation("A family id is required"));
    }
    Ok(())
}

fn require_token(access_token: &str) -> Result<()> {
    if access_token.trim().is_empty() {
        return Err(Error::validation(
            "The family has no linked account, an access token is required",
        ));
    }
    Ok(())
}
