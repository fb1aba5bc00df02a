//! Command handlers for the ledger CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod init;
mod reports;
mod rule;
mod sync;

use crate::api::{transaction_source, Mode};
use crate::model::YearMonth;
use crate::{Config, Pipeline, Result};
use chrono::Local;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

pub use init::init;
pub use reports::{breakdown, chart, dashboard, overview, savings};
pub use rule::rule;
pub use sync::sync;

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Wires the configured database and the transaction source for `mode` into a `Pipeline`.
fn pipeline(config: &Config, mode: Mode, secret: Option<&str>) -> Result<Pipeline> {
    let source = transaction_source(config, mode, secret)?;
    Ok(Pipeline::new(Arc::new(config.db().clone()), source)
        .with_empty_fetch_policy(config.empty_fetch_policy()))
}

/// A `Pipeline` over the configured database for the commands that never fetch, so they work
/// without the provider secret.
fn store_pipeline(config: &Config) -> Pipeline {
    Pipeline::store_only(Arc::new(config.db().clone()))
}

/// `month`, or the current month in local time when it is not given.
fn month_or_current(month: Option<YearMonth>) -> YearMonth {
    month.unwrap_or_else(|| YearMonth::from_date(Local::now().date_naive()))
}
