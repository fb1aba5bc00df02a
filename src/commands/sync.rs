use crate::api::Mode;
use crate::commands::{pipeline, Out};
use crate::engine::SyncReport;
use crate::{Config, Result};

/// Pulls new transactions for `family_id` and folds them into the monthly ledger.
pub async fn sync(
    config: Config,
    mode: Mode,
    secret: Option<&str>,
    family_id: &str,
    access_token: &str,
) -> Result<Out<SyncReport>> {
    let report = pipeline(&config, mode, secret)?
        .sync(family_id, access_token)
        .await?;
    let message = if report.months.is_empty() {
        format!(
            "Nothing new for '{family_id}' between {} and {}",
            report.window_start, report.window_end
        )
    } else {
        format!(
            "Synced {} of {} fetched transactions into {} month(s) for '{family_id}'",
            report.classified,
            report.fetched,
            report.months.len()
        )
    };
    Ok(Out::new(message, report))
}
