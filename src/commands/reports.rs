//! Read-only commands: totals, charts, breakdowns and the combined dashboard.

use crate::api::Mode;
use crate::commands::{month_or_current, pipeline, store_pipeline, Out};
use crate::model::{Breakdown, ChartBundle, Dashboard, Dimension, MonthEntry, Overview, YearMonth};
use crate::{Config, Result};

/// The persisted income and expense totals for `month`, defaulting to the current month.
pub async fn overview(
    config: Config,
    family_id: &str,
    month: Option<YearMonth>,
) -> Result<Out<Overview>> {
    let month = month_or_current(month);
    let overview = store_pipeline(&config).overview(family_id, month).await?;
    Ok(Out::new(
        format!(
            "{}: income {}, expenses {}",
            month.label(),
            overview.income,
            overview.expenses
        ),
        overview,
    ))
}

/// Cumulative daily spending and the category and merchant breakdowns for `month`.
pub async fn chart(
    config: Config,
    mode: Mode,
    secret: Option<&str>,
    family_id: &str,
    access_token: &str,
    month: Option<YearMonth>,
) -> Result<Out<ChartBundle>> {
    let month = month_or_current(month);
    let bundle = pipeline(&config, mode, secret)?
        .chart_data(family_id, access_token, month)
        .await?;
    Ok(Out::new(
        format!(
            "{}: {} transactions, {} spent",
            month.label(),
            bundle.current_month_transactions.len(),
            bundle.cumulative.current.total()
        ),
        bundle,
    ))
}

/// Income and expenses for each of the last twelve months.
pub async fn savings(config: Config, family_id: &str) -> Result<Out<Vec<MonthEntry>>> {
    let history = store_pipeline(&config).savings_history(family_id).await?;
    let mut message = String::from("Savings history:");
    for entry in &history {
        message.push_str(&format!(
            "\n  {:<16} income {:>14}  expenses {:>14}",
            entry.month_label,
            entry.income.to_string(),
            entry.expenses.to_string()
        ));
    }
    Ok(Out::new(message, history))
}

/// Spending for `month` and the two months before it, grouped by `dimension`.
pub async fn breakdown(
    config: Config,
    mode: Mode,
    secret: Option<&str>,
    family_id: &str,
    access_token: &str,
    month: Option<YearMonth>,
    dimension: Dimension,
) -> Result<Out<Breakdown>> {
    let month = month_or_current(month);
    let breakdown = pipeline(&config, mode, secret)?
        .breakdown(family_id, access_token, month, dimension)
        .await?;
    let mut message = format!("Spending by {dimension} for {}:", month.label());
    for (label, amount) in breakdown.labels.iter().zip(&breakdown.values.current) {
        message.push_str(&format!("\n  {label:<32} {:>14}", amount.to_string()));
    }
    Ok(Out::new(message, breakdown))
}

/// Everything the budget page needs for `month` in one call.
pub async fn dashboard(
    config: Config,
    mode: Mode,
    secret: Option<&str>,
    family_id: &str,
    access_token: &str,
    month: Option<YearMonth>,
) -> Result<Out<Dashboard>> {
    let month = month_or_current(month);
    let dashboard = pipeline(&config, mode, secret)?
        .dashboard(family_id, access_token, month)
        .await?;
    Ok(Out::new(
        format!(
            "{}: {} incomes and {} expenses, persisted income {} and expenses {}",
            month.label(),
            dashboard.incomes.len(),
            dashboard.expenses.len(),
            dashboard.overview.income,
            dashboard.overview.expenses
        ),
        dashboard,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;
    use crate::ErrorType;
    use std::str::FromStr;

    fn march() -> Option<YearMonth> {
        Some(YearMonth::from_str("2024-03").unwrap())
    }

    #[tokio::test]
    async fn test_breakdown_by_merchant() {
        let env = TestEnv::new().await;
        let out = breakdown(
            env.config(),
            Mode::Testing,
            None,
            "fam",
            "tok",
            march(),
            Dimension::Merchant,
        )
        .await
        .unwrap();
        let breakdown = out.structure().unwrap();
        assert_eq!(breakdown.dimension, Dimension::Merchant);
        assert_eq!(breakdown.labels[0], "Maple Street Properties");
        assert!(out.message().contains("Maple Street Properties"));
    }

    #[tokio::test]
    async fn test_chart_and_overview() {
        let env = TestEnv::new().await;
        let out = chart(env.config(), Mode::Testing, None, "fam", "tok", march())
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().current_month_transactions.len(), 8);

        // Charts never write, so the persisted totals are still zero.
        let out = overview(env.config(), "fam", march())
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap(), &Overview::default());
    }

    #[tokio::test]
    async fn test_savings_and_dashboard() {
        let env = TestEnv::new().await;
        let out = savings(env.config(), "fam").await.unwrap();
        assert_eq!(out.structure().unwrap().len(), 12);

        let out = dashboard(env.config(), Mode::Testing, None, "fam", "tok", march())
            .await
            .unwrap();
        let dashboard = out.structure().unwrap();
        assert_eq!(dashboard.incomes.len() + dashboard.expenses.len(), 8);
    }

    #[tokio::test]
    async fn test_store_reads_need_no_secret() {
        let env = TestEnv::new().await;
        let out = overview(env.config(), "fam", march()).await.unwrap();
        assert!(out.message().contains("March 2024"));
        let out = savings(env.config(), "fam").await.unwrap();
        assert_eq!(out.structure().unwrap().len(), 12);

        // Commands that fetch still need it.
        let err = chart(env.config(), Mode::Live, None, "fam", "tok", march())
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let env = TestEnv::new().await;
        let err = chart(env.config(), Mode::Testing, None, "fam", " ", march())
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }
}
