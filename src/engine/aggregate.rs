//! Read-side views recomputed from a fresh three month fetch. Nothing here writes to the store, so
//! these views can disagree with the persisted monthly totals until the next sync.

use crate::engine::{apply_rules, require_family, require_token, Pipeline};
use crate::error::{ErrorType, IntoResult};
use crate::model::{
    Amount, Breakdown, BreakdownValues, ChartBundle, ClassifiedTransaction, CumulativeData,
    DailySeries, Dimension, YearMonth,
};
use crate::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

impl Pipeline {
    /// Builds the spending charts for `month`, looking back two further months.
    ///
    /// Fails as a whole if either the fetch or the rule lookup fails.
    pub async fn chart_data(
        &self,
        family_id: &str,
        access_token: &str,
        month: YearMonth,
    ) -> Result<ChartBundle> {
        let classified = self.classified_window(family_id, access_token, month).await?;
        Ok(chart_bundle(month, &classified))
    }

    /// Spending per category or per merchant for `month` and the two months before it.
    pub async fn breakdown(
        &self,
        family_id: &str,
        access_token: &str,
        month: YearMonth,
        dimension: Dimension,
    ) -> Result<Breakdown> {
        let classified = self.classified_window(family_id, access_token, month).await?;
        Ok(breakdown(month, &classified, dimension))
    }

    /// Fetches `[first day of month-2, last day of month]` and classifies it, with the fetch and
    /// the rule lookup running concurrently.
    async fn classified_window(
        &self,
        family_id: &str,
        access_token: &str,
        month: YearMonth,
    ) -> Result<Vec<ClassifiedTransaction>> {
        require_family(family_id)?;
        require_token(access_token)?;

        let start = month.minus(2).first_day();
        let end = month.last_day();
        debug!("Fetching {start} through {end} for the {month} charts");

        let source = self.source()?;
        let fetch = async {
            source
                .list_transactions(access_token, start, end)
                .await
                .pub_result(ErrorType::UpstreamFetch)
        };
        let rules = async {
            self.store
                .get_rules(family_id)
                .await
                .pub_result(ErrorType::Store)
        };
        let (transactions, rules) = tokio::try_join!(fetch, rules)?;
        Ok(apply_rules(&transactions, &rules))
    }
}

pub(crate) fn chart_bundle(month: YearMonth, classified: &[ClassifiedTransaction]) -> ChartBundle {
    ChartBundle {
        month: Some(month),
        current_month_transactions: classified
            .iter()
            .filter(|c| month.contains(c.transaction().date()))
            .cloned()
            .collect(),
        cumulative: CumulativeData {
            current: cumulative_series(month, classified),
            previous: cumulative_series(month.prev(), classified),
        },
        categories: breakdown(month, classified, Dimension::Category),
        merchants: breakdown(month, classified, Dimension::Merchant),
    }
}

/// A running total of spending for every day of `month`. Only debits dated within the month count.
pub fn cumulative_series(month: YearMonth, classified: &[ClassifiedTransaction]) -> DailySeries {
    let mut daily: HashMap<NaiveDate, Amount> = HashMap::new();
    for c in debits(classified).filter(|c| month.contains(c.transaction().date())) {
        *daily.entry(c.transaction().date()).or_default() += c.transaction().amount();
    }

    let mut running = Amount::ZERO;
    let (dates, cumulative): (Vec<_>, Vec<_>) = month
        .days()
        .map(|day| {
            running += daily.get(&day).copied().unwrap_or_default();
            (day, running)
        })
        .unzip();
    DailySeries { dates, cumulative }
}

/// Spending per label for `month`, the month before and the month before that.
///
/// Labels are every label seen in any of the three months, ordered by the requested month's
/// spending, largest first. Labels that tie keep the order they were first seen in, looking at the
/// requested month first. Each value vector lines up with `labels` and holds zero where a label had
/// no spending that month.
pub fn breakdown(
    month: YearMonth,
    classified: &[ClassifiedTransaction],
    dimension: Dimension,
) -> Breakdown {
    let months = [month, month.prev(), month.minus(2)];
    let mut labels: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut sums: Vec<[Amount; 3]> = Vec::new();

    for (slot, bucket_month) in months.iter().enumerate() {
        for c in debits(classified).filter(|c| bucket_month.contains(c.transaction().date())) {
            let label = match dimension {
                Dimension::Category => c.breakdown_category(),
                Dimension::Merchant => c.merchant_label(),
            };
            let i = *index.entry(label.to_string()).or_insert_with(|| {
                labels.push(label.to_string());
                sums.push([Amount::ZERO; 3]);
                labels.len() - 1
            });
            sums[i][slot] += c.transaction().amount().abs();
        }
    }

    let mut order: Vec<usize> = (0..labels.len()).collect();
    // `sort_by` is stable, so ties keep first-seen order.
    order.sort_by(|a, b| sums[*b][0].cmp(&sums[*a][0]));

    let column = |slot: usize| order.iter().map(|i| sums[*i][slot]).collect::<Vec<_>>();
    Breakdown {
        dimension,
        values: BreakdownValues {
            current: column(0),
            previous: column(1),
            two_months_ago: column(2),
        },
        labels: order.iter().map(|i| labels[*i].clone()).collect(),
    }
}

fn debits(classified: &[ClassifiedTransaction]) -> impl Iterator<Item = &ClassifiedTransaction> {
    classified.iter().filter(|c| c.is_expense())
}
