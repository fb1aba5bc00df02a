//! These structs provide the CLI interface for the ledger CLI.

use crate::config::{EmptyFetchPolicy, ProviderConfig, ProviderEnvironment};
use crate::model::{Dimension, FlowType, RuleUpdate, YearMonth};
use crate::PROVIDER_SECRET_ENV;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing::level_filters::LevelFilter;

/// ledger: Keeps a family's monthly budget in step with its bank transactions.
///
/// Transactions are fetched from the provider for each family's linked account, filtered and
/// categorized by the family's rules, and folded into per-month income and expense totals. The
/// read commands show those totals along with spending charts and breakdowns.
///
/// Set LEDGER_IN_TEST_MODE to run against built-in sample data instead of the provider.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and the database.
    ///
    /// This is the first command to run. The provider client id is stored in the configuration
    /// file; the provider secret never is, pass it with --provider-secret or LEDGER_PROVIDER_SECRET
    /// when running the other commands.
    Init(InitArgs),
    /// Fetch new transactions for a family and fold them into its monthly totals.
    Sync(SyncArgs),
    /// Show the persisted income and expense totals for a month.
    Overview(OverviewArgs),
    /// Show the cumulative spending chart and breakdowns for a month.
    Chart(ChartArgs),
    /// Show income and expenses for each of the last twelve months.
    Savings(SavingsArgs),
    /// Show spending per category or merchant for a month and the two months before it.
    Breakdown(BreakdownArgs),
    /// Exclude or categorize a transaction, or every transaction from a merchant.
    Rule(RuleArgs),
    /// Show everything the budget page needs for a month.
    Dashboard(ChartArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where ledger data and configuration is held. Defaults to ~/ledger
    #[arg(long, env = "LEDGER_HOME", default_value_t = default_ledger_home())]
    ledger_home: DisplayPath,

    /// The provider API secret. Only needed when fetching from the provider.
    #[arg(long, env = PROVIDER_SECRET_ENV, hide_env_values = true)]
    provider_secret: Option<String>,
}

impl Common {
    pub fn new(log_level: LevelFilter, ledger_home: PathBuf) -> Self {
        Self {
            log_level,
            ledger_home: ledger_home.into(),
            provider_secret: None,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn ledger_home(&self) -> &DisplayPath {
        &self.ledger_home
    }

    pub fn provider_secret(&self) -> Option<&str> {
        self.provider_secret.as_deref()
    }
}

/// (Not shown): Args for the `ledger init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The provider deployment to fetch transactions from.
    #[arg(long, value_enum, default_value_t = ProviderEnvironment::Sandbox)]
    environment: ProviderEnvironment,

    /// The provider client id.
    #[arg(long)]
    client_id: String,

    /// Overrides the provider URL for the chosen environment.
    #[arg(long)]
    base_url: Option<String>,

    /// What a sync does when the rules changed but nothing was fetched: "skip" leaves the totals
    /// alone, "recompute" resets the current month to zero.
    #[arg(long, value_enum, default_value_t = EmptyFetchPolicy::Skip)]
    empty_fetch_policy: EmptyFetchPolicy,
}

impl InitArgs {
    pub fn new(environment: ProviderEnvironment, client_id: impl Into<String>) -> Self {
        Self {
            environment,
            client_id: client_id.into(),
            base_url: None,
            empty_fetch_policy: EmptyFetchPolicy::default(),
        }
    }

    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig {
            environment: self.environment,
            base_url: self.base_url.clone(),
            client_id: self.client_id.clone(),
        }
    }

    pub fn empty_fetch_policy(&self) -> EmptyFetchPolicy {
        self.empty_fetch_policy
    }
}

/// (Not shown): Args for the `ledger sync` command.
#[derive(Debug, Parser, Clone)]
pub struct SyncArgs {
    /// The family whose ledger is updated.
    family_id: String,

    /// The access token of the family's linked account.
    access_token: String,
}

impl SyncArgs {
    pub fn new(family_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            family_id: family_id.into(),
            access_token: access_token.into(),
        }
    }

    pub fn family_id(&self) -> &str {
        &self.family_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

/// (Not shown): Args for the `ledger overview` command.
#[derive(Debug, Parser, Clone)]
pub struct OverviewArgs {
    family_id: String,

    /// The month to show as YYYY-MM. Defaults to the current month.
    #[arg(long)]
    month: Option<YearMonth>,
}

impl OverviewArgs {
    pub fn family_id(&self) -> &str {
        &self.family_id
    }

    pub fn month(&self) -> Option<YearMonth> {
        self.month
    }
}

/// (Not shown): Args for the `ledger chart` and `ledger dashboard` commands.
#[derive(Debug, Parser, Clone)]
pub struct ChartArgs {
    family_id: String,

    /// The access token of the family's linked account.
    access_token: String,

    /// The month to show as YYYY-MM. Defaults to the current month.
    #[arg(long)]
    month: Option<YearMonth>,
}

impl ChartArgs {
    pub fn family_id(&self) -> &str {
        &self.family_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn month(&self) -> Option<YearMonth> {
        self.month
    }
}

/// (Not shown): Args for the `ledger savings` command.
#[derive(Debug, Parser, Clone)]
pub struct SavingsArgs {
    family_id: String,
}

impl SavingsArgs {
    pub fn family_id(&self) -> &str {
        &self.family_id
    }
}

/// (Not shown): Args for the `ledger breakdown` command.
#[derive(Debug, Parser, Clone)]
pub struct BreakdownArgs {
    #[clap(flatten)]
    chart: ChartArgs,

    /// Group spending by category or by merchant.
    #[arg(long = "by", value_enum, default_value_t = Dimension::Category)]
    dimension: Dimension,
}

impl BreakdownArgs {
    pub fn chart(&self) -> &ChartArgs {
        &self.chart
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }
}

/// (Not shown): Args for the `ledger rule` command.
#[derive(Debug, Parser, Clone)]
pub struct RuleArgs {
    family_id: String,

    /// Whether the rule applies to income or expense transactions.
    #[arg(long, value_enum)]
    flow_type: FlowType,

    /// The transaction the rule applies to.
    #[arg(long)]
    transaction_id: Option<String>,

    /// The merchant of the transaction. With --apply-to-all the rule covers every transaction
    /// from this merchant.
    #[arg(long)]
    merchant: Option<String>,

    #[arg(long)]
    apply_to_all: bool,

    /// The category to assign. Required unless --exclude is given.
    #[arg(long)]
    category: Option<String>,

    /// Leave the transaction out of totals and charts.
    #[arg(long)]
    exclude: bool,
}

impl RuleArgs {
    pub fn family_id(&self) -> &str {
        &self.family_id
    }

    pub fn update(&self) -> RuleUpdate {
        RuleUpdate {
            transaction_id: self.transaction_id.clone(),
            merchant: self.merchant.clone(),
            apply_to_all: self.apply_to_all,
            category: self.category.clone(),
            exclude: self.exclude,
            flow_type: self.flow_type,
        }
    }
}

fn default_ledger_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("ledger"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --ledger-home or LEDGER_HOME instead of relying on the default \
                ledger home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("ledger")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
