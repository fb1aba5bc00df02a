use clap::Parser;
use ledger_sync::args::{Args, Command};
use ledger_sync::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().ledger_home().path();
    let secret = args.common().provider_secret();

    // When LEDGER_IN_TEST_MODE is set and non-empty, transactions come from the built-in sample
    // data instead of the provider.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init(init_args) => {
            commands::init(home, init_args.provider(), init_args.empty_fetch_policy())
                .await?
                .print()
        }

        Command::Sync(a) => {
            let config = Config::load(home).await?;
            commands::sync(config, mode, secret, a.family_id(), a.access_token())
                .await?
                .print()
        }

        Command::Overview(a) => {
            let config = Config::load(home).await?;
            commands::overview(config, a.family_id(), a.month())
                .await?
                .print()
        }

        Command::Chart(a) => {
            let config = Config::load(home).await?;
            commands::chart(
                config,
                mode,
                secret,
                a.family_id(),
                a.access_token(),
                a.month(),
            )
            .await?
            .print()
        }

        Command::Savings(a) => {
            let config = Config::load(home).await?;
            commands::savings(config, a.family_id()).await?.print()
        }

        Command::Breakdown(a) => {
            let config = Config::load(home).await?;
            let chart = a.chart();
            commands::breakdown(
                config,
                mode,
                secret,
                chart.family_id(),
                chart.access_token(),
                chart.month(),
                a.dimension(),
            )
            .await?
            .print()
        }

        Command::Rule(a) => {
            let config = Config::load(home).await?;
            commands::rule(config, a.family_id(), a.update())
                .await?
                .print()
        }

        Command::Dashboard(a) => {
            let config = Config::load(home).await?;
            commands::dashboard(
                config,
                mode,
                secret,
                a.family_id(),
                a.access_token(),
                a.month(),
            )
            .await?
            .print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => EnvFilter::from_default_env(),
        None => {
            // Without RUST_LOG, only this program's own logs are shown.
            EnvFilter::new(format!(
                "ledger_sync={level},{}={level}",
                env!("CARGO_BIN_NAME")
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
