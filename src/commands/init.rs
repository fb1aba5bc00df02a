use crate::commands::Out;
use crate::config::{EmptyFetchPolicy, ProviderConfig};
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory and:
/// - Creates an initial `config.json` file from `provider` and `empty_fetch_policy`
/// - Creates the SQLite database with the current schema
///
/// # Arguments
/// - `ledger_home` - The directory that will be the root of data directory, e.g. `$HOME/ledger`
/// - `provider` - Which provider deployment to fetch from and the client id to use with it. The
///   provider secret is not stored; it is passed at run time.
///
/// # Errors
/// - Returns an error if any file operations fail or if the directory is already initialized.
pub async fn init(
    ledger_home: &Path,
    provider: ProviderConfig,
    empty_fetch_policy: EmptyFetchPolicy,
) -> Result<Out<()>> {
    let config = Config::create(ledger_home, provider, empty_fetch_policy)
        .await
        .context("Unable to create the data directory and configs")
        .pub_result(ErrorType::Config)?;
    Ok(format!(
        "Successfully created the ledger directory at {}",
        config.root().display()
    )
    .into())
}
