//! Configuration file handling.
//!
//! The configuration file is stored at `$LEDGER_HOME/config.json`. It says which provider
//! environment to fetch transactions from and how a sync treats an empty fetch. The provider secret
//! is never written to it.

use crate::db::Db;
use crate::error::{ErrorType, IntoResult, Res};
use crate::Result;
use crate::utils;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

const APP_NAME: &str = "ledger";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const LEDGER_SQLITE: &str = "ledger.sqlite";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$LEDGER_HOME` and from there it loads `$LEDGER_HOME/config.json` and opens the
/// SQLite database.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the data directory, writes an initial `config.json` and creates the database.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of data directory, e.g. `$HOME/ledger`
    /// - `provider` - Which provider environment to fetch transactions from
    /// - `empty_fetch_policy` - What a sync does with changed rules when nothing was fetched
    ///
    /// # Errors
    /// - Returns an error if any file operations fail, or if a database already exists.
    pub async fn create(
        dir: impl Into<PathBuf>,
        provider: ProviderConfig,
        empty_fetch_policy: EmptyFetchPolicy,
    ) -> Res<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the ledger home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;
        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!(
                "A config file already exists at '{}'",
                config_path.display()
            );
        }

        let config_file = ConfigFile {
            provider,
            empty_fetch_policy,
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(LEDGER_SQLITE);
        let db = Db::init(&sqlite_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    /// This will
    /// - validate that `ledger_home` and the config file exist
    /// - load the config file
    /// - open the database, upgrading its schema if needed
    pub async fn load(ledger_home: impl Into<PathBuf>) -> Result<Self> {
        Self::read(ledger_home.into())
            .await
            .pub_result(ErrorType::Config)
    }

    async fn read(maybe_relative: PathBuf) -> Res<Self> {
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("Ledger Home is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let sqlite_path = config_file.sqlite_path(&root);
        let db = Db::load(&sqlite_path)
            .await
            .context("Unable to load SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.config_file.provider
    }

    pub fn empty_fetch_policy(&self) -> EmptyFetchPolicy {
        self.config_file.empty_fetch_policy
    }
}

/// The provider deployment that transactions are fetched from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEnvironment {
    #[default]
    Sandbox,
    Development,
    Production,
}

serde_plain::derive_display_from_serialize!(ProviderEnvironment);
serde_plain::derive_fromstr_from_deserialize!(ProviderEnvironment);

impl ProviderEnvironment {
    fn default_base_url(&self) -> &'static str {
        match self {
            ProviderEnvironment::Sandbox => "https://sandbox.plaid.com/",
            ProviderEnvironment::Development => "https://development.plaid.com/",
            ProviderEnvironment::Production => "https://production.plaid.com/",
        }
    }
}

/// Connection settings for the transaction provider, minus the secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ProviderConfig {
    pub environment: ProviderEnvironment,

    /// Overrides the environment's URL, e.g. to point at a proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    pub client_id: String,
}

impl ProviderConfig {
    /// The URL requests are sent to. Always ends in a slash so that paths can be joined onto it.
    pub fn base_url(&self) -> Res<Url> {
        let raw = self
            .base_url
            .as_deref()
            .unwrap_or(self.environment.default_base_url());
        let with_slash = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        Url::parse(&with_slash).with_context(|| format!("Invalid provider base URL '{raw}'"))
    }
}

/// What a sync does when the provider returns no transactions for the window while the rules are
/// marked as changed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum EmptyFetchPolicy {
    /// Clear the changed mark without touching any totals.
    #[default]
    Skip,
    /// Recompute the current month from the (empty) fetch, which resets its totals to zero.
    Recompute,
}

serde_plain::derive_display_from_serialize!(EmptyFetchPolicy);
serde_plain::derive_fromstr_from_deserialize!(EmptyFetchPolicy);

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "ledger",
///   "config_version": 1,
///   "provider": {
///     "environment": "sandbox",
///     "client_id": "5f1e0c9a8b7d6e5f4a3b2c1d"
///   },
///   "empty_fetch_policy": "skip"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "ledger"
    app_name: String,

    config_version: u8,

    provider: ProviderConfig,

    #[serde(default)]
    empty_fetch_policy: EmptyFetchPolicy,

    /// Path to the SQLite file, relative to the ledger home or absolute.
    /// Defaults to $LEDGER_HOME/ledger.sqlite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sqlite_path: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            provider: ProviderConfig::default(),
            empty_fetch_policy: EmptyFetchPolicy::default(),
            sqlite_path: None,
        }
    }
}

impl ConfigFile {
    async fn load(path: &Path) -> Res<Self> {
        let config: ConfigFile = utils::deserialize(path).await?;
        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        Ok(config)
    }

    async fn save(&self, path: &Path) -> Res<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }

    fn sqlite_path(&self, root: &Path) -> PathBuf {
        match &self.sqlite_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => root.join(p),
            None => root.join(LEDGER_SQLITE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider() -> ProviderConfig {
        ProviderConfig {
            environment: ProviderEnvironment::Development,
            base_url: None,
            client_id: "client".into(),
        }
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("ledger");
        let created = Config::create(&home, provider(), EmptyFetchPolicy::Skip).await.unwrap();
        assert!(created.sqlite_path().is_file());
        assert!(created.config_path().is_file());

        let loaded = Config::load(&home).await.unwrap();
        assert_eq!(loaded.provider(), &provider());
        assert_eq!(loaded.empty_fetch_policy(), EmptyFetchPolicy::Skip);
        assert_eq!(loaded.root(), created.root());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let dir = TempDir::new().unwrap();
        Config::create(dir.path(), provider(), EmptyFetchPolicy::Skip).await.unwrap();
        assert!(Config::create(dir.path(), provider(), EmptyFetchPolicy::Skip).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_app_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        let file = ConfigFile {
            app_name: "budget".into(),
            ..ConfigFile::default()
        };
        file.save(&path).await.unwrap();
        assert!(ConfigFile::load(&path).await.is_err());
    }

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{
            "app_name": "ledger",
            "config_version": 1,
            "provider": { "environment": "production", "client_id": "abc" }
        }"#;
        let file: ConfigFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.empty_fetch_policy, EmptyFetchPolicy::Skip);
        assert_eq!(file.provider.environment, ProviderEnvironment::Production);
        assert_eq!(
            file.sqlite_path(Path::new("/home")),
            PathBuf::from("/home/ledger.sqlite")
        );
    }

    #[test]
    fn test_base_url() {
        let mut p = provider();
        assert_eq!(
            p.base_url().unwrap().as_str(),
            "https://development.plaid.com/"
        );
        p.base_url = Some("http://localhost:8080/plaid".into());
        assert_eq!(
            p.base_url().unwrap().join("transactions/get").unwrap().as_str(),
            "http://localhost:8080/plaid/transactions/get"
        );
        p.base_url = Some("not a url".into());
        assert!(p.base_url().is_err());
    }
}
