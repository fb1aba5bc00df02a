//! Keeps per-family monthly budget totals in step with bank transactions fetched from a provider,
//! and builds comparative spending views from them.

mod api;
pub mod args;
pub mod commands;
mod config;
mod db;
mod engine;
mod error;
pub mod model;
mod utils;


pub use api::{
    transaction_source, FetchRequest, Mode, PlaidSource, TestSource, TransactionSource,
    PROVIDER_SECRET_ENV, TEST_MODE_ENV,
};
pub use config::{Config, EmptyFetchPolicy, ProviderConfig, ProviderEnvironment};
pub use db::{Db, LedgerStore};
pub use engine::{apply_rules, breakdown, cumulative_series, Pipeline, SyncReport};
pub use error::{Error, ErrorType, Result, StoreConflict};
